pub mod trading;
pub mod order;
pub mod position;
pub mod candle;
pub mod ledger;

pub use trading::*;
pub use order::*;
pub use position::*;
pub use candle::*;
pub use ledger::*;
