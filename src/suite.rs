//! Correctness tests: run an input's test suite against a build output.

use crate::catalog::TestSpec;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::harness::exec;
use crate::server::WebServer;
use std::path::Path;
use tracing::{info, warn};

/// Failure string recorded on a result whose tests did not pass.
pub const TEST_FAILURE: &str = "test failure";

/// Serves `test.webroot` with `/bundle.js` replaced by `bundle` and runs the
/// test file through the configured runner.
///
/// Returns `Ok(Some(TEST_FAILURE))` when the suite reports failures. Errors
/// are reserved for the server failing to come up.
pub fn run_tests(settings: &Settings, test: &TestSpec, bundle: &Path) -> Result<Option<&'static str>> {
    let mut server = WebServer::new(&test.webroot);
    server.remap("/bundle.js", bundle);
    server.start(settings.port)?;

    info!(webroot = %test.webroot, test = %test.test, bundle = %bundle.display(), "running tests");
    let cmd = settings.test_runner.replace("%%test%%", &test.test);
    let outcome = exec(&cmd);

    server.stop()?;

    match outcome {
        Ok(()) => {
            info!("no errors");
            Ok(None)
        }
        Err(e) => {
            match e {
                Error::CommandFailed { status, .. } => warn!(%status, "test suite reported failures"),
                other => warn!(error = %other, "test runner could not be started"),
            }
            warn!("run test manually via\n$ {}", server.cmdline());
            Ok(Some(TEST_FAILURE))
        }
    }
}
