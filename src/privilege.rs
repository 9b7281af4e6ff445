//! Root requirement for scripts that touch privileged resources.

use log::Log;

use crate::logger;

pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Return only if the effective user is root; otherwise log a CRITICAL line
/// and exit with status 1.
pub fn require_root() {
    if !is_root() {
        let logger = logger::logger();
        logger.critical("root access is needed to run this script, exiting...");
        logger.flush();
        std::process::exit(1);
    }
}
