#[tokio::main]
async fn main() {
    if let Err(e) = stompgate_server::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
