use std::io::Write;

use neovolt_bridge::prelude::*;

fn init_logger(loglevel: &str) {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(loglevel),
    )
    .format(|buf, record| {
        writeln!(
            buf,
            "[{} {} {}] {}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
            record.level(),
            record.module_path().unwrap_or(""),
            record.args()
        )
    })
    .write_style(env_logger::WriteStyle::Never)
    .try_init();
}

#[tokio::main]
async fn main() {
    let options = Options::new();

    // config isn't loaded yet; start at info so the config dump is visible
    init_logger("info");

    let config = match Config::new(options.config_file) {
        Ok(config) => config,
        Err(err) => {
            error!("failed to load config: {:?}", err);
            std::process::exit(255);
        }
    };

    init_logger(&config.loglevel);

    if let Err(err) = neovolt_bridge::run(config).await {
        error!("{:?}", err);
        std::process::exit(255);
    }
}
