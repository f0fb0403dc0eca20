mod content_fetcher;
mod telegram;

pub use content_fetcher::{truncate_chars, ContentFetcher};
pub use telegram::{Notifier, TelegramNotifier};
