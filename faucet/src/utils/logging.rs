use tracing_subscriber::{EnvFilter, filter::Directive, fmt, prelude::*};

const QUIET_TARGETS: [&str; 4] = ["hyper=info", "jsonrpsee=info", "warp=info", "mio=info"];

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        QUIET_TARGETS
            .iter()
            .filter_map(|directive| directive.parse::<Directive>().ok())
            .fold(EnvFilter::new("debug"), |filter, directive| {
                filter.add_directive(directive)
            })
    });

    let standard_format = fmt::format()
        .with_timer(fmt::time::time())
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::Layer::default()
                .with_writer(std::io::stdout)
                .event_format(standard_format),
        )
        .init();
}
