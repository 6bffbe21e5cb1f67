use dotenvy::dotenv;
use newsletter_dispatch::api;
use newsletter_dispatch::config::Settings;

/// Entry point for the cron-triggered delivery server.
#[tokio::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    dotenv().ok();

    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        log::warn!("A rustls crypto provider was already installed");
    }

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = api::serve(settings).await {
        log::error!("{e}");
        std::process::exit(1);
    }
}
