use super::*;
use uuid::Uuid;

pub(super) fn load_config(path: &Path) -> Result<Config> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let config_file: ConfigFile = toml::from_str(&contents).context("parse config")?;
    let config_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let token = config_file.token.trim().to_string();
    if token.is_empty() {
        return Err(anyhow!("token is empty"));
    }
    let block_size = config_file.block_size.unwrap_or(DEFAULT_BLOCK_SIZE);
    if block_size == 0 {
        return Err(anyhow!("block_size must be positive"));
    }
    let default_max = config_file.default_max.unwrap_or(DEFAULT_MAX);
    if default_max == 0 {
        return Err(anyhow!("default_max must be positive"));
    }
    let users_path = config_file
        .users_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_USERS_PATH));

    Ok(Config {
        token,
        users_path: resolve_config_path(&users_path, config_dir),
        block_size,
        default_max,
        default_template: config_file
            .default_template
            .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
        chat_delay: Duration::from_millis(config_file.chat_delay_ms.unwrap_or(CHAT_DELAY_MS)),
        channel_delay: Duration::from_millis(
            config_file.channel_delay_ms.unwrap_or(CHANNEL_DELAY_MS),
        ),
        rate_limit_default: Duration::from_secs(
            config_file
                .rate_limit_default_secs
                .unwrap_or(RATE_LIMIT_DEFAULT_SECS),
        ),
        text_format: config_file.text_format.unwrap_or(TextFormat::Html),
        decorate_indices: config_file.decorate_indices.unwrap_or(true),
    })
}

pub(super) fn resolve_config_path(path: &Path, config_dir: &Path) -> PathBuf {
    if path.is_relative() {
        config_dir.join(path)
    } else {
        path.to_path_buf()
    }
}

pub(super) fn parse_command(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    if !first.starts_with('/') {
        return None;
    }
    let cmd = first.trim_start_matches('/');
    Some(cmd.split('@').next().unwrap_or(cmd))
}

pub(super) fn short_id() -> String {
    let id = Uuid::new_v4().to_string();
    id.split('-').next().unwrap_or(&id).to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(super) struct UserRecord {
    pub(super) timestamp: String,
    pub(super) user_id: u64,
    pub(super) username: Option<String>,
}

/// Append-only log of every user the bot has seen, one JSON object per line.
pub(super) struct UserLog {
    path: PathBuf,
    seen: Mutex<HashSet<u64>>,
}

impl UserLog {
    pub(super) fn open(path: &Path) -> Result<Self> {
        let seen = match fs::read_to_string(path) {
            Ok(contents) => seen_user_ids(&contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("read user log {}", path.display()))
            }
        };
        Ok(UserLog {
            path: path.to_path_buf(),
            seen: Mutex::new(seen),
        })
    }

    /// Records `actor` the first time it shows up. Write failures are logged
    /// and otherwise ignored.
    ///
    /// The lock stays held across the append so one user is never written
    /// twice; the file I/O itself runs on the blocking pool.
    pub(super) async fn record(&self, actor: &Actor) -> bool {
        let mut seen = self.seen.lock().await;
        if seen.contains(&actor.id) {
            return false;
        }
        let record = UserRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            user_id: actor.id,
            username: actor.username.clone(),
        };
        let path = self.path.clone();
        let written = tokio::task::spawn_blocking(move || append_user_record(&path, &record))
            .await
            .context("user log writer panicked")
            .and_then(|result| result);
        match written {
            Ok(()) => {
                seen.insert(actor.id);
                true
            }
            Err(err) => {
                error!("user log write failed: {:#}", err);
                false
            }
        }
    }
}

pub(super) fn seen_user_ids(contents: &str) -> HashSet<u64> {
    let mut seen = HashSet::new();
    for (number, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<UserRecord>(line) {
            Ok(record) => {
                seen.insert(record.user_id);
            }
            Err(err) => warn!("skipping user log line {}: {}", number + 1, err),
        }
    }
    seen
}

pub(super) fn append_user_record(path: &Path, record: &UserRecord) -> Result<()> {
    let mut line = serde_json::to_string(record).context("serialize user record")?;
    line.push('\n');
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open user log {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append user log {}", path.display()))?;
    Ok(())
}

/// Carries out what a conversation step asked for. Failures are logged; one
/// chat's trouble never reaches the dispatcher.
pub(super) async fn run_effects(state: &Arc<AppState>, chat_id: ChatId, effects: Vec<Effect>) {
    for effect in effects {
        match effect {
            Effect::Reply { text, keyboard } => {
                let options = SendOptions {
                    format: TextFormat::Plain,
                    keyboard,
                };
                if let Err(err) = state
                    .delivery
                    .send_with_retry(&Recipient::Id(chat_id), &text, &options)
                    .await
                {
                    error!("reply failed: {:#}", err);
                }
            }
            Effect::Block { range, template } => {
                let keyboard = build_nav_keyboard(&range);
                if let Err(err) = state
                    .delivery
                    .deliver_one(&DeliveryTarget::Conversation(chat_id), &range, &template, keyboard)
                    .await
                {
                    error!("block {}-{} failed: {:#}", range.start, range.end, err);
                }
            }
            Effect::Sweep(job) => {
                state.sweeps.spawn(job).await;
            }
        }
    }
}

pub(super) async fn send_main_menu(state: &Arc<AppState>, chat_id: ChatId) {
    let effects = vec![
        Effect::Reply {
            text: "Hi welcome to Gifts info bot".to_string(),
            keyboard: None,
        },
        Effect::Reply {
            text: "Please choose an option:".to_string(),
            keyboard: Some(build_main_menu()),
        },
    ];
    run_effects(state, chat_id, effects).await;
}
