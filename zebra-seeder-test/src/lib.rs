//! Shared test setup for the Zebra seeder.
#![doc(html_favicon_url = "https://zfnd.org/wp-content/uploads/2022/03/zebra-favicon-128.png")]
#![doc(html_logo_url = "https://zfnd.org/wp-content/uploads/2022/03/zebra-icon.png")]
// Standard lints
#![warn(missing_docs)]
#![deny(clippy::await_holding_lock)]
#![forbid(unsafe_code)]

use std::{collections::HashSet, sync::Once};

use color_eyre::config::{Frame, HookBuilder};
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Backtrace frames from the async runtime and test harness, which are
/// hidden from error reports.
const HIDDEN_FRAME_PREFIXES: &[&str] = &[
    "tokio::",
    "<tokio::",
    "<futures_util::",
    "<T as futures_util",
    "<tracing::instrument::Instrumented",
    "hyper::",
    "<hyper::",
    "proptest::",
    "std::panic",
    "<std::panic::AssertUnwindSafe",
    "std::thread::local",
    "core::ops::function::FnOnce::call_once",
    "<core::future::",
    "<alloc::boxed::Box",
    "core::result::Result",
    "test::run_test_in_process",
    "test::assert_test_result",
];

/// Initialize the tracing subscriber and the error report hooks for tests.
///
/// Every test should call this first. Only the first call in each test
/// process has any effect.
///
/// Logs are filtered by the `RUST_LOG` env var. By default, the seeder's
/// expected warnings from failure path tests are hidden.
pub fn init() {
    INIT.call_once(|| {
        let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("warn").add_directive(
                "zebra_seeder=error"
                    .parse()
                    .expect("hard-coded directive is valid"),
            )
        });

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt::layer().with_target(false).with_test_writer())
            .with(ErrorLayer::default())
            .init();

        HookBuilder::default()
            .add_frame_filter(Box::new(hide_harness_frames))
            .install()
            .expect("error report hooks are only installed once");
    })
}

/// Removes duplicate frames, and frames that match [`HIDDEN_FRAME_PREFIXES`].
fn hide_harness_frames(frames: &mut Vec<&Frame>) {
    let mut seen_locations = HashSet::new();

    frames.retain(|frame| {
        if !seen_locations.insert((frame.lineno, frame.filename.clone())) {
            return false;
        }

        // Keep frames without symbol names, they might be seeder code.
        frame.name.as_deref().map_or(true, |name| {
            !HIDDEN_FRAME_PREFIXES
                .iter()
                .any(|prefix| name.starts_with(prefix))
        })
    });
}
