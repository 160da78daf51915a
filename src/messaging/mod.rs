// Messaging between callers and the serial clock contexts

pub mod channels;
pub mod command;
