pub(crate) const DEFAULT_LISTEN: &str = "127.0.0.1:5000";
pub(crate) const DEFAULT_MINE_TIMEOUT_SECS: u64 = 60;
pub(crate) const MINED_MESSAGE: &str = "Congratulations you just mine a block!";
pub(crate) const VALID_MESSAGE: &str = "The blockchain is valid";
pub(crate) const INVALID_MESSAGE: &str = "The blockchain has some problems";
