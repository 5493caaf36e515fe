use bugreport::{
    bugreport,
    collector::{CompileTimeInformation, EnvironmentVariables, OperatingSystem, SoftwareVersion},
    format::Markdown,
};

pub fn run() {
    bugreport!()
        .info(SoftwareVersion::default())
        .info(OperatingSystem::default())
        .info(EnvironmentVariables::list(&[
            "SHELL",
            "TERM",
            "RUST_LOG",
            "GENIE_PORT",
            "GENIE_DATA_DIR",
            "GENIE_PUBLIC_DIR",
            "GENIE_ENGINE",
            "GENIE_ENGINE_ARGS",
            "GENIE_JOB_TIMEOUT_SECS",
            "GENIE_JOB_SPAWN_RETRIES",
            "GENIE_SEED_ROOMS",
            "GENIE_MAX_BODY_BYTES",
            "GENIE_MAX_REFERENCE_BYTES",
        ]))
        .info(CompileTimeInformation::default())
        .print::<Markdown>();
}
