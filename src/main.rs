// Command-line entry point for posture-coach

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    posture_coach_lib::run().await
}
