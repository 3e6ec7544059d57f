use crate::error::{AssistantError, Result};
use crate::llm::tools::{FunctionDescriptor, LlmTool, ToolDescriptor};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const WEATHER_TOOL_NAME: &str = "get_weather";

const DEFAULT_BASE_URL: &str = "http://api.openweathermap.org";
const TIMEOUT_SECONDS: u64 = 10;

/// Connection settings for the OpenWeather API
#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl WeatherConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(TIMEOUT_SECONDS),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    main: MainReadings,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
    feels_like: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

/// Current conditions for one city, as reported by the upstream API
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub city: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub description: String,
    pub humidity: f64,
}

impl WeatherReport {
    /// Render the report as the Russian sentence handed to the model
    pub fn sentence(&self) -> String {
        format!(
            "В городе {} сейчас {:.1}°C, ощущается как {:.1}°C. {}. Влажность: {}%.",
            self.city,
            self.temperature,
            self.feels_like,
            capitalize(&self.description),
            self.humidity
        )
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Weather lookup exposed to the model as `get_weather`
///
/// Failures never escape [`WeatherTool::execute`]: they are turned into a
/// readable sentence because the result is read by the model as plain text.
#[derive(Clone)]
pub struct WeatherTool {
    client: reqwest::Client,
    config: WeatherConfig,
}

impl WeatherTool {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(WeatherConfig::new(api_key))
    }

    pub fn with_config(config: WeatherConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Look up the weather and always return a sentence, success or not.
    pub async fn execute(&self, city: &str) -> String {
        match self.fetch(city).await {
            Ok(report) => report.sentence(),
            Err(AssistantError::UpstreamWeatherError(message)) => {
                warn!("Weather API rejected request for {}: {}", city, message);
                format!("Не удалось получить погоду для {}. Ошибка: {}", city, message)
            }
            Err(e) => {
                warn!("Weather request for {} failed: {}", city, e);
                format!("Ошибка при запросе погоды: {}", e)
            }
        }
    }

    /// Single best-effort request to the upstream API
    pub async fn fetch(&self, city: &str) -> Result<WeatherReport> {
        info!("Requesting weather for {}", city);

        let response = self
            .client
            .get(format!("{}/data/2.5/weather", self.config.base_url))
            .query(&[
                ("q", city),
                ("appid", self.config.api_key.as_str()),
                ("units", "metric"),
                ("lang", "ru"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!("Weather API answered {} ({} bytes)", status, body.len());

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(AssistantError::UpstreamWeatherError(message));
        }

        let parsed: WeatherResponse = serde_json::from_str(&body)?;
        let description = parsed
            .weather
            .into_iter()
            .next()
            .map(|c| c.description)
            .ok_or_else(|| {
                AssistantError::UpstreamWeatherError("no weather description".to_string())
            })?;

        Ok(WeatherReport {
            city: city.to_string(),
            temperature: parsed.main.temp,
            feels_like: parsed.main.feels_like,
            description,
            humidity: parsed.main.humidity,
        })
    }
}

#[async_trait]
impl LlmTool for WeatherTool {
    async fn run(&self, args: &Map<String, Value>) -> Result<String> {
        let city = args.get("city").and_then(|v| v.as_str()).ok_or_else(|| {
            AssistantError::ToolArgumentError("Missing required argument: city".to_string())
        })?;

        Ok(self.execute(city).await)
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            r#type: "function".to_string(),
            function: FunctionDescriptor {
                name: WEATHER_TOOL_NAME.to_string(),
                description: "Получить текущую погоду в указанном городе".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "city": {
                            "type": "string",
                            "description": "Название города, например, Москва, Berlin, Tokyo"
                        }
                    },
                    "required": ["city"]
                }),
            },
        }
    }
}
