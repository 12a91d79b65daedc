use obstack::config::Config;

fn main() {
    let config = Config::from_args();

    env_logger::Builder::new()
        .filter_level(config.log_level)
        .parse_env("RUST_LOG")
        .format_timestamp_secs()
        .init();

    let code = match obstack::run(&config) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("obstack: {e}");
            e.exit_code()
        }
    };
    std::process::exit(code);
}
