use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use teloxide::dispatching::{Dispatcher, HandlerExt, UpdateFilterExt};
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::payloads::{EditMessageTextSetters, SendMessageSetters};
use teloxide::prelude::Requester;
use teloxide::prelude::Update;
use teloxide::types::{Message, ParseMode};
use teloxide::utils::html;
use teloxide::{Bot, dispatching::DefaultKey, dptree, utils::command::BotCommands};
use url::Url;

mod config;

const MAX_LINKS_PER_MESSAGE: usize = 5;

static LINK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("Invalid regex pattern"));

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:", parse_with="split")]
enum Command{
    #[command(description = "start bot")]
    Start,
    #[command(description = "check a link for phishing")]
    Check(String),
}

#[derive(Deserialize, Debug, PartialEq)]
struct Verdict {
    url: String,
    is_phishing: bool,
    ssl_valid: bool,
}

struct MainBot{
    pub dispatcher: Dispatcher<Arc<Bot>, anyhow::Error, DefaultKey>,
}
impl MainBot {
    async fn new(config: Arc<config::Config>) -> Result<Self> {
        let tg = Arc::new(
            Bot::new(
                config.telegram_bot_token.clone()
            )
        );
        tg.set_my_commands(Command::bot_commands()).await?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let handler = Update::filter_message()
            .branch(
                dptree::entry()
                    .filter_command::<Command>()
                    .endpoint(handle_command),
            )
            .branch(
                dptree::filter(|message: Message| message.text().is_some_and(is_unparsed_command))
                    .endpoint(handle_bad_command),
            )
            .branch(
                dptree::filter(|message: Message| message.text().is_some())
                    .endpoint(handle_links),
            );
        let dispatcher = Dispatcher::builder(tg.clone(), handler)
            .dependencies(dptree::deps![config.clone(), http])
            .error_handler(LoggingErrorHandler::with_custom_text(
                "an error has occurred in the dispatcher",
            ))
            .build();
        Ok(MainBot{
            dispatcher,
        })
    }
     pub fn spawn(
        mut self,
    ) -> (
        tokio::task::JoinHandle<()>,
        teloxide::dispatching::ShutdownToken,
    ) {
        let shutdown_token = self.dispatcher.shutdown_token();
        (
            tokio::spawn(async move { self.dispatcher.dispatch().await }),
            shutdown_token,
        )
    }
}

/// Reached only after `filter_command` rejected the text, e.g. `/check` without a link.
fn is_unparsed_command(text: &str) -> bool {
    text.trim_start().starts_with('/')
}

fn usage_text() -> String {
    format!(
        "❌ <b>Ошибка:</b> неверная команда\n\n{}",
        html::escape(&Command::descriptions().to_string())
    )
}

/// Links in order of appearance, duplicates dropped.
fn extract_links(text: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for m in LINK_PATTERN.find_iter(text) {
        let link = m.as_str().trim_end_matches(['.', ',', ')', ';', '!', '?']);
        if !links.iter().any(|l| l == link) {
            links.push(link.to_string());
        }
    }
    links
}

fn format_verdict(verdict: &Verdict) -> String {
    let phishing = if verdict.is_phishing {
        "🚨 <b>Фишинг обнаружен</b>"
    } else {
        "✅ Признаков фишинга нет"
    };
    let ssl = if verdict.ssl_valid {
        "✅ Сертификат действителен"
    } else {
        "⚠ <b>Сертификат недействителен или отсутствует</b>"
    };
    format!(
        "📊 <b>Результаты проверки:</b> <code>{}</code>\n\n🔗 {}\n🔒 {}",
        html::escape(&verdict.url),
        phishing,
        ssl
    )
}

async fn check_url(http: &Client, detector_address: &str, url: &str) -> Result<Verdict> {
    let resp = http
        .post(format!("http://{}/check_url", detector_address))
        .json(&json!({ "url": url }))
        .send()
        .await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or_default();
        anyhow::bail!("detector returned {}: {}", status, body["message"].as_str().unwrap_or("unknown error"));
    }
    Ok(resp.json().await?)
}

async fn scan_and_reply(bot: &Bot, message: &Message, http: &Client, config: &config::Config, url: &str) -> Result<()> {
    if Url::parse(url).is_err() {
        bot.send_message(message.chat.id, "❌ <b>Ошибка:</b> Некорректная структура URL")
            .parse_mode(ParseMode::Html)
            .await?;
        return Ok(());
    }
    let msg = bot.send_message(message.chat.id, "⏳ <b>Начинаю проверку...</b>".to_string())
        .parse_mode(ParseMode::Html)
        .await?;
    bot.send_chat_action(message.chat.id, teloxide::types::ChatAction::Typing).await?;

    let text = match check_url(http, &config.detector_address, url).await {
        Ok(verdict) => format_verdict(&verdict),
        Err(e) => {
            log::error!("check of {url} failed: {e:#}");
            "❌ <b>Ошибка:</b> сервис проверки недоступен, попробуйте позже".to_string()
        }
    };
    bot.edit_message_text(message.chat.id, msg.id, text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

async fn handle_command(
    message: Message,
    bot: Arc<Bot>,
    command: Command,
    config: Arc<config::Config>,
    http: Client,
) -> Result<()> {
    match command {
        Command::Start => {
            let text = "\
                ✅ <b>Добро пожаловать в бота для обнаружения фишинговых ссылок!</b>\n\n\
                ✨ <i>Как пользоваться:</i>\n\
                • Введите <code>/check url</code>, где <code>url</code> — это ссылка, которую нужно проверить.\n\
                • Или просто перешлите сообщение со ссылками.\n\
                ℹ Бот оценит ссылку моделью и проверит TLS сертификат сайта."
                .to_string();

            bot.send_message(message.chat.id, text)
                .parse_mode(ParseMode::Html)
                .await?;
        }
        Command::Check(url) => {
            scan_and_reply(&bot, &message, &http, &config, url.trim()).await?;
        }
    }
    Ok(())
}

async fn handle_bad_command(message: Message, bot: Arc<Bot>) -> Result<()> {
    bot.send_message(message.chat.id, usage_text())
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

async fn handle_links(
    message: Message,
    bot: Arc<Bot>,
    config: Arc<config::Config>,
    http: Client,
) -> Result<()> {
    let Some(text) = message.text() else {
        return Ok(());
    };
    for link in extract_links(text).into_iter().take(MAX_LINKS_PER_MESSAGE) {
        scan_and_reply(&bot, &message, &http, &config, &link).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main()-> Result<()>{
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Arc::new(config::read_config()?);
    log::info!("using detector at {}", config.detector_address);
    let bot = MainBot::new(config.clone()).await?;
    let (bot_handle, _) = bot.spawn();
    bot_handle.await?;

    Ok(())
}
