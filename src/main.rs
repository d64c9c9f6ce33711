use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(err) = donordirect::start_server().await {
        error!(error = %err, "fatal: server failed to start");
        std::process::exit(1);
    }
}
