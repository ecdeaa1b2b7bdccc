use env_logger::Env;
use kyt_tracer::config;
use kyt_tracer::types::{ChainId, TxId};
use kyt_tracer::KytEngine;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = match config::load() {
        Ok(args) => args,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    let engine = match KytEngine::new(&args) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("failed to build engine: {e}");
            std::process::exit(1);
        }
    };

    match engine
        .analyze(ChainId::new(&args.chain), TxId::from(args.tx_id.as_str()), args.depth)
        .await
    {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => log::error!("failed to serialize report: {e}"),
        },
        Err(e) => {
            log::error!("analysis failed: {e}");
            std::process::exit(1);
        }
    }
}
