pub mod config;
pub mod doctor;
pub mod migrate;
pub mod simulate;

pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}
