#[tokio::main]
async fn main() {
    rewind_api::run().await;
}
