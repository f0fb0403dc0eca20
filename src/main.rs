use std::sync::Arc;

mod ai;
mod app;
mod config;
mod db;
mod embedding;
mod error;
mod feed;
mod models;
mod ranking;
mod services;

use ai::GroqJudge;
use app::App;
use config::Config;
use embedding::BertEmbedder;
use error::{AppError, Result};
use models::Signal;
use ranking::Ranker;
use services::TelegramNotifier;

const USAGE: &str = "\
Usage:
  feed-curator --poll
  feed-curator --register <user_id> [handle]
  feed-curator --subscribe <user_id> <url>
  feed-curator --feeds <user_id>
  feed-curator --track <user_id> <url>
  feed-curator --feedback <user_id> <item_id> <like|dislike>
  feed-curator --feedback <user_id> <like:item_id|dislike:item_id>
  feed-curator --digest <user_id>";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1).map(String::as_str) else {
        println!("{USAGE}");
        return Ok(());
    };

    let config = Config::load()?;

    match command {
        "--poll" => {
            // Credentials are checked before any network or model work.
            let groq_key = config.require_groq_key()?.to_string();
            let bot_token = config.require_telegram_token()?.to_string();

            let embedder = Arc::new(BertEmbedder::load(&config.embedding_model_dir)?);
            let judge = Arc::new(GroqJudge::new(groq_key, &config.judge)?);
            let ranker = Ranker::new(embedder, judge, config.ranking.clone());
            let notifier = TelegramNotifier::new(bot_token)?;

            let app = App::new(config).await?;
            let report = app.poll(&ranker, &notifier).await?;
            println!(
                "Ingested {} new articles, ranked {}, accepted {}, delivered {}",
                report.ingested, report.ranked, report.accepted, report.delivered
            );
        }
        "--register" => {
            let user_id = user_id_arg(&args)?;
            let handle = args.get(3).cloned();
            let app = App::new(config).await?;
            let added = app.register(user_id, handle).await?;
            println!("Registered user {user_id} ({added} default feeds subscribed)");
        }
        "--subscribe" => {
            let user_id = user_id_arg(&args)?;
            let url = required_arg(&args, 3, "url")?;
            let app = App::new(config).await?;
            let feed = app.subscribe(user_id, url).await?;
            println!("Subscribed to {} ({})", feed.title, feed.url);
        }
        "--feeds" => {
            let user_id = user_id_arg(&args)?;
            let app = App::new(config).await?;
            let feeds = app.feeds(user_id).await?;
            if feeds.is_empty() {
                println!("No subscriptions");
            }
            for feed in feeds {
                println!("{feed}");
            }
        }
        "--track" => {
            let user_id = user_id_arg(&args)?;
            let url = required_arg(&args, 3, "url")?;
            let embedder = Arc::new(BertEmbedder::load(&config.embedding_model_dir)?);
            let app = App::new(config).await?;
            if app.track(user_id, url, embedder).await? {
                println!("Tracking {url}");
            } else {
                println!("Tracking {url} (no readable text, not used for similarity)");
            }
        }
        "--feedback" => {
            let user_id = user_id_arg(&args)?;
            let (signal, item_id) = feedback_args(&args)?;
            let app = App::new(config).await?;
            app.record_feedback(user_id, &item_id, signal).await?;
            println!("Recorded {signal} for {item_id}");
        }
        "--digest" => {
            let user_id = user_id_arg(&args)?;
            let app = App::new(config).await?;
            print!("{}", app.digest(user_id).await?);
        }
        _ => println!("{USAGE}"),
    }

    Ok(())
}

fn required_arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| AppError::Config(format!("missing <{name}>\n{USAGE}")))
}

fn user_id_arg(args: &[String]) -> Result<i64> {
    let raw = required_arg(args, 2, "user_id")?;
    raw.parse()
        .map_err(|_| AppError::Config(format!("invalid user id: {raw}")))
}

/// Accepts either `<item_id> <signal>` or a single `like:<item_id>` callback payload.
fn feedback_args(args: &[String]) -> Result<(Signal, String)> {
    let first = required_arg(args, 3, "item_id")?;
    match args.get(4) {
        Some(signal) => Ok((signal.parse()?, first.to_string())),
        None => Signal::parse_callback(first)
            .ok_or_else(|| AppError::Config(format!("unrecognized feedback: {first}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_feedback_args_forms() {
        let (signal, item) =
            feedback_args(&args(&["bin", "--feedback", "7", "abc123", "dislike"])).unwrap();
        assert_eq!(signal, Signal::Dislike);
        assert_eq!(item, "abc123");

        let (signal, item) =
            feedback_args(&args(&["bin", "--feedback", "7", "like:abc123"])).unwrap();
        assert_eq!(signal, Signal::Like);
        assert_eq!(item, "abc123");

        assert!(feedback_args(&args(&["bin", "--feedback", "7", "abc123"])).is_err());
        assert!(feedback_args(&args(&["bin", "--feedback", "7", "abc123", "meh"])).is_err());
    }

    #[test]
    fn test_user_id_arg() {
        assert_eq!(user_id_arg(&args(&["bin", "--feeds", "42"])).unwrap(), 42);
        assert!(user_id_arg(&args(&["bin", "--feeds", "bob"])).is_err());
        assert!(user_id_arg(&args(&["bin", "--feeds"])).is_err());
    }
}
