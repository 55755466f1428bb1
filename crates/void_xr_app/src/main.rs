//! void-xr runner
//!
//! Drives one XR application until the runtime ends the session for good
//! or the process receives Ctrl+C. The backend comes from the boot
//! configuration; the stub backend needs no headset.
//!
//! Run with: cargo run -p void_xr_app
//!       or: VOID_XR_BACKEND=openxr cargo run -p void_xr_app --features openxr

mod boot_config;

use boot_config::{Backend, BootConfig, BootError};
use thiserror::Error;
use void_xr::prelude::*;
use void_xr::{GraphicsFactory, RuntimeLoader};

#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Boot(#[from] BootError),

    #[error(transparent)]
    Xr(#[from] XrError),

    #[error("Backend {0} is not available in this build")]
    Unavailable(Backend),
}

fn main() {
    let config = match BootConfig::load() {
        Ok(config) => config,
        Err(e) => {
            init_logging(false);
            log::error!("{}", e);
            std::process::exit(1);
        }
    };
    init_logging(config.debug);

    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("PANIC: {}", panic_info);
    }));

    config.print_summary();

    if let Err(e) = run(&config) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).try_init();
}

fn run(config: &BootConfig) -> Result<(), RunError> {
    log::info!("Starting with backend: {}", config.backend);

    let loader = loader(config)?;
    let graphics: GraphicsFactory =
        Box::new(|_ctx: &Context| Ok(Box::new(HeadlessGraphicsService::new()) as Box<dyn GraphicsService>));

    let mut app = Application::new(
        config.context_creation()?,
        config.session.clone(),
        loader,
        Box::new(NullRenderer),
        graphics,
    )
    .with_event_policy(config.event_policy);

    let termination = app.termination_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, shutting down...");
        termination.request();
    }) {
        log::warn!("Failed to set Ctrl+C handler: {}", e);
    }

    app.run()?;
    Ok(())
}

fn loader(config: &BootConfig) -> Result<Box<dyn RuntimeLoader>, RunError> {
    match config.backend {
        Backend::Stub => Ok(Box::new(StubRuntime::new().auto_lifecycle(config.stub_frames))),
        #[cfg(feature = "openxr")]
        Backend::OpenXr => Ok(Box::new(OpenXrLoader::new().map_err(XrError::from)?)),
        backend => Err(RunError::Unavailable(backend)),
    }
}
