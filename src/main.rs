use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match pacevault::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("pacevault: {e}");
            ExitCode::FAILURE
        }
    }
}
