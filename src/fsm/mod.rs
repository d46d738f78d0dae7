mod fsm_accessor;

pub use fsm_accessor::*;
