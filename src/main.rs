use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode, Recipient, User};
use tokio::sync::Mutex;

mod callback_handlers;
mod conversation;
mod delivery;
mod helpers;
mod message_handlers;
mod pagination;
mod render;
mod sweeps;

use callback_handlers::handle_callback;
use conversation::*;
use delivery::*;
use helpers::*;
use message_handlers::handle_message;
use pagination::*;
use render::*;
use sweeps::*;

const DEFAULT_BLOCK_SIZE: u64 = 100;
const DEFAULT_MAX: u64 = 100_000;
const DEFAULT_TEMPLATE: &str = "http://t.me/nft/JackintheBox-";
const CHAT_DELAY_MS: u64 = 2_000;
const CHANNEL_DELAY_MS: u64 = 3_000;
const RATE_LIMIT_DEFAULT_SECS: u64 = 2;
const DEFAULT_USERS_PATH: &str = "users.txt";

const DEFAULT_BLOCK_PREFIX: &str = "default_paginated_";
/// Telegram caps a message at 4096 UTF-16 units; stay under it with markup included.
const MESSAGE_BUDGET: usize = 4_000;

#[derive(Debug, Deserialize)]
struct ConfigFile {
    token: String,
    users_path: Option<PathBuf>,
    block_size: Option<u64>,
    default_max: Option<u64>,
    default_template: Option<String>,
    chat_delay_ms: Option<u64>,
    channel_delay_ms: Option<u64>,
    rate_limit_default_secs: Option<u64>,
    text_format: Option<TextFormat>,
    decorate_indices: Option<bool>,
}

#[derive(Debug, Clone)]
struct Config {
    token: String,
    users_path: PathBuf,
    block_size: u64,
    default_max: u64,
    default_template: String,
    chat_delay: Duration,
    channel_delay: Duration,
    rate_limit_default: Duration,
    text_format: TextFormat,
    decorate_indices: bool,
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    config: PathBuf,
}

/// How message text is interpreted by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TextFormat {
    Plain,
    Markdown,
    Html,
}

impl TextFormat {
    fn parse_mode(self) -> Option<ParseMode> {
        match self {
            TextFormat::Plain => None,
            TextFormat::Markdown => Some(ParseMode::MarkdownV2),
            TextFormat::Html => Some(ParseMode::Html),
        }
    }
}

/// A contiguous, 1-based window of link indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LinkRange {
    start: u64,
    end: u64,
    has_next: bool,
    has_prev: bool,
    next_start: u64,
    prev_start: u64,
}

#[derive(Debug, Clone, Copy)]
struct RenderOptions {
    format: TextFormat,
    decorate: bool,
}

#[derive(Debug, Clone)]
struct SendOptions {
    format: TextFormat,
    keyboard: Option<InlineKeyboardMarkup>,
}

impl SendOptions {
    fn plain() -> Self {
        SendOptions {
            format: TextFormat::Plain,
            keyboard: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DeliveryTarget {
    Conversation(ChatId),
    External(String),
}

#[derive(Debug, Clone)]
struct SweepJob {
    origin: ChatId,
    target: DeliveryTarget,
    upper_bound: u64,
    template: String,
    announce: Option<String>,
    completion: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SweepReport {
    delivered: u64,
    failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    AwaitingCustomLink,
    AwaitingCustomQuantity,
    CustomChoiceMade,
    AwaitingChannel,
}

#[derive(Debug, Clone)]
struct Session {
    step: Step,
    link_template: Option<String>,
    quantity: Option<u64>,
    destination: Option<String>,
}

/// Button payloads, decoded once from callback data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    DefaultBlock { start: u64 },
    Info,
    SweepDefault,
    CustomOptions,
    CustomChat,
    CustomChannel,
    Unknown,
}

#[derive(Debug, Clone)]
struct Actor {
    id: u64,
    username: Option<String>,
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Actor {
            id: user.id.0,
            username: user.username.clone(),
        }
    }
}

/// What a conversation step asks the bot to do next.
#[derive(Debug, Clone)]
enum Effect {
    Reply {
        text: String,
        keyboard: Option<InlineKeyboardMarkup>,
    },
    Block {
        range: LinkRange,
        template: String,
    },
    Sweep(SweepJob),
}

struct AppState {
    conversation: Conversation,
    delivery: Arc<Delivery>,
    sweeps: Arc<Sweeps>,
    users: UserLog,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = load_config(&args.config)?;

    let bot = Bot::new(config.token.clone());
    let transport: Arc<dyn Transport> = Arc::new(TelegramTransport::new(bot.clone()));
    let delivery = Arc::new(Delivery::new(transport, DeliverySettings::from_config(&config)));
    let users = UserLog::open(&config.users_path)?;

    let state = Arc::new(AppState {
        conversation: Conversation::new(FlowSettings::from_config(&config)),
        sweeps: Arc::new(Sweeps::new(delivery.clone())),
        delivery,
        users,
    });

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    info!("bot is polling");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
