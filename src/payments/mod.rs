mod paystack;

pub use paystack::*;
