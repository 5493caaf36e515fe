pub async fn run() {
    if let Err(e) = server::run().await {
        eprintln!("server stopped: {e}");
        std::process::exit(1);
    }
}
