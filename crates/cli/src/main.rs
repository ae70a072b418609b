//! LLM Locality CLI entry point.

#[tokio::main]
async fn main() {
    if let Err(e) = llm_locality_cli::run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
