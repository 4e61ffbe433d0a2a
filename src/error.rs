//! Crate-wide error types.
//!
//! Every fallible operation in this crate returns the `Result` defined here. Fatal
//! conditions (configuration, sandbox setup, fork/pipe failures at the OS level, and
//! result-write failures) are modeled as named `ErrorKind` variants; everything else
//! comes in through `foreign_links` from the crates that can fail underneath us.

use crate::seccomp::SeccompError;

error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }

    foreign_links {
        Io(::std::io::Error);
        Nix(::nix::Error);
        Json(::serde_json::Error);
        Seccomp(SeccompError);
    }

    errors {
        InvalidPolicy(msg: String) {
            description("invalid policy file")
            display("invalid policy file: {}", msg)
        }

        SandboxSetupFailed(msg: String) {
            description("failed to prepare sandbox environment")
            display("failed to prepare sandbox environment: {}", msg)
        }

        ForkFailed(msg: String) {
            description("failed to fork child process")
            display("failed to fork child process: {}", msg)
        }

        ResultWriteFailed(msg: String) {
            description("failed to write result artifact")
            display("failed to write result artifact: {}", msg)
        }
    }
}
