//! Interactive weather assistant.
//!
//! Reads settings from the environment (see `AssistantConfig`), then answers
//! questions on stdin until an empty line is entered.

use anyhow::Context;
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;
use weather_assistant::config::AssistantConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AssistantConfig::from_env().context("failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = config.ensure_ollama_available().await {
        tracing::warn!("Availability check failed: {}", e);
        println!(
            "❌ Не удалось подключиться к Ollama. Убедитесь, что Ollama запущена: `ollama serve`"
        );
        return Err(anyhow::Error::new(e).context(format!(
            "Ollama is not reachable at {}",
            config.ollama_host
        )));
    }
    println!("✅ Ollama доступна ({})", config.ollama_host);

    let mut session = config.session()?;

    println!("🌤️ Ассистент погоды ({})", config.model);
    println!("Спросите о погоде, например: 'Какая погода в Париже?'");
    println!("Пустая строка завершает работу.\n");

    loop {
        print!("Вы: ");
        io::stdout().flush()?;

        let mut query = String::new();
        if io::stdin().read_line(&mut query)? == 0 {
            break;
        }
        let query = query.trim();

        if query.is_empty() {
            println!("\nДо свидания!");
            break;
        }

        let answer = session.send(query).await;
        println!("Ассистент: {}\n", answer);
    }

    Ok(())
}
