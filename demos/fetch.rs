use kit::{CacheMode, HttpService, KitConfig, RequestOptions};

// Fetches a URL twice through the disk cache and prints what came back.
//
//   cargo run --example fetch -- https://example.com/ [cache-dir]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let url = args.next().unwrap_or_else(|| "https://example.com/".to_string());
    let cache_dir = args.next().unwrap_or_else(|| "kit-cache".to_string());

    // Configure the service through the config builder. Every value can also be
    // overridden per call with `RequestOptions`.
    let config = KitConfig::builder()
        .cache_dir(&cache_dir)
        .cache_mode(CacheMode::Full)
        .cache_tag("demo")
        .repeat(true)
        .max_attempts(3)
        .pause_secs(2)
        .timeout_secs(30)
        .build()?;
    let service = HttpService::new(config)?;

    // Ctrl-C cancels whatever is in flight
    let cancel = service.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    for round in 1..=2 {
        let mut response = service.get(&url, RequestOptions::new()).await?;
        let body = response.text().await?;
        println!(
            "round {round}: {} {} ({}, {} bytes, cached: {})",
            response.status_code(),
            response.reason(),
            response.mime(),
            body.len(),
            response.is_cached()
        );
    }

    if let Some(cookies) = service.cookies_for(&url)? {
        println!("cookies: {cookies}");
    }
    if let Some(cache) = service.cache() {
        println!("cache entries in {cache_dir}: {}", cache.len()?);
    }

    Ok(())
}
