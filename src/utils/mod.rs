pub mod helper;
pub mod clock;
