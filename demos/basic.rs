use basestack_flags::{Client, ClientBuilder, FlagAdapter, Prefetch};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Initialize the client; BASESTACK_* variables fill in anything not set here
    let client: Client = ClientBuilder::from_env()
        .with_project_key("your-project-key")
        .with_environment_key("your-environment-key")
        .with_cache_ttl_ms(60_000)
        .build()?;
    println!("{}", client.debug_info());

    // Fetch a single flag
    match client.get_flag("my-feature").await? {
        Some(flag) => println!("Feature 'my-feature' is enabled: {}", flag.enabled),
        None => println!("Feature 'my-feature' does not exist"),
    }

    // List all flags; they are cached for later lookups
    let all_flags = client.list_flags().await?;
    println!("All flags:");
    for flag in all_flags {
        println!("  {}: {} {:?}", flag.slug, flag.enabled, flag.payload);
    }

    // Error-swallowing lookups for request handlers
    let adapter = FlagAdapter::new(client)
        .with_prefetch(Prefetch::All)
        .with_on_error(|e| eprintln!("flag lookup failed: {}", e));
    adapter.initialize().await;
    println!("checkout-v2 on: {}", adapter.enabled("checkout-v2").await);

    Ok(())
}
