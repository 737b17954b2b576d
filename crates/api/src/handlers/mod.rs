pub mod submissions;
pub mod themes;
