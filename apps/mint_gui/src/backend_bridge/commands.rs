//! Backend commands queued from UI to backend worker.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCommand {
    CheckExistingConnection,
    CheckNetwork,
    Connect,
    Mint,
}

impl BackendCommand {
    pub fn name(self) -> &'static str {
        match self {
            BackendCommand::CheckExistingConnection => "check_existing_connection",
            BackendCommand::CheckNetwork => "check_network",
            BackendCommand::Connect => "connect",
            BackendCommand::Mint => "mint",
        }
    }
}
