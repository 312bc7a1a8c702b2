mod dead_letter;
mod order;
mod payment_record;

pub use dead_letter::*;
pub use order::*;
pub use payment_record::*;
