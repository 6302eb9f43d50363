use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    sse_tool_gateway::infra::logging::init();
    sse_tool_gateway::cli::run().await
}
