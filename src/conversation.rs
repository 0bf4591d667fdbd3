use super::*;

const INFO_TOKEN: &str = "info";
const SWEEP_DEFAULT_TOKEN: &str = "send_all";
const CUSTOM_OPTIONS_TOKEN: &str = "custom_options";
const CUSTOM_CHAT_TOKEN: &str = "custom_chat";
const CUSTOM_CHANNEL_TOKEN: &str = "custom_channel";

impl Action {
    pub(super) fn parse(data: &str) -> Self {
        if let Some(rest) = data.strip_prefix(DEFAULT_BLOCK_PREFIX) {
            return Action::DefaultBlock {
                start: normalize_start(rest),
            };
        }
        match data {
            INFO_TOKEN => Action::Info,
            SWEEP_DEFAULT_TOKEN => Action::SweepDefault,
            CUSTOM_OPTIONS_TOKEN => Action::CustomOptions,
            CUSTOM_CHAT_TOKEN => Action::CustomChat,
            CUSTOM_CHANNEL_TOKEN => Action::CustomChannel,
            _ => Action::Unknown,
        }
    }

    pub(super) fn token(&self) -> String {
        match self {
            Action::DefaultBlock { start } => format!("{}{}", DEFAULT_BLOCK_PREFIX, start),
            Action::Info => INFO_TOKEN.to_string(),
            Action::SweepDefault => SWEEP_DEFAULT_TOKEN.to_string(),
            Action::CustomOptions => CUSTOM_OPTIONS_TOKEN.to_string(),
            Action::CustomChat => CUSTOM_CHAT_TOKEN.to_string(),
            Action::CustomChannel => CUSTOM_CHANNEL_TOKEN.to_string(),
            Action::Unknown => String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub(super) struct FlowSettings {
    pub(super) block_size: u64,
    pub(super) default_max: u64,
    pub(super) default_template: String,
}

impl FlowSettings {
    pub(super) fn from_config(config: &Config) -> Self {
        FlowSettings {
            block_size: config.block_size,
            default_max: config.default_max,
            default_template: config.default_template.clone(),
        }
    }
}

/// In-memory sessions keyed by conversation id. One lock serializes every
/// transition, so two events for the same chat never interleave.
#[derive(Default)]
pub(super) struct SessionStore {
    sessions: Mutex<HashMap<i64, Session>>,
}

impl SessionStore {
    #[cfg(test)]
    pub(super) async fn get(&self, chat_id: ChatId) -> Option<Session> {
        self.sessions.lock().await.get(&chat_id.0).cloned()
    }
}

pub(super) struct Conversation {
    settings: FlowSettings,
    store: SessionStore,
}

fn reply(text: impl Into<String>) -> Effect {
    Effect::Reply {
        text: text.into(),
        keyboard: None,
    }
}

fn reply_with(text: impl Into<String>, keyboard: InlineKeyboardMarkup) -> Effect {
    Effect::Reply {
        text: text.into(),
        keyboard: Some(keyboard),
    }
}

impl Conversation {
    pub(super) fn new(settings: FlowSettings) -> Self {
        Conversation {
            settings,
            store: SessionStore::default(),
        }
    }

    #[cfg(test)]
    pub(super) fn store(&self) -> &SessionStore {
        &self.store
    }

    pub(super) async fn cancel(&self, chat_id: ChatId) -> bool {
        self.store.sessions.lock().await.remove(&chat_id.0).is_some()
    }

    pub(super) async fn handle_action(
        &self,
        chat_id: ChatId,
        actor: &Actor,
        action: Action,
    ) -> Vec<Effect> {
        let mut sessions = self.store.sessions.lock().await;
        match action {
            Action::DefaultBlock { start } => {
                match compute_range(start, self.settings.block_size, self.settings.default_max) {
                    Ok(range) => vec![Effect::Block {
                        range,
                        template: self.settings.default_template.clone(),
                    }],
                    Err(_) => vec![reply("Invalid selection.")],
                }
            }
            Action::Info => vec![reply(info_text(actor))],
            Action::SweepDefault => vec![Effect::Sweep(SweepJob {
                origin: chat_id,
                target: DeliveryTarget::Conversation(chat_id),
                upper_bound: self.settings.default_max,
                template: self.settings.default_template.clone(),
                announce: Some(
                    "Starting to send all gift links. This may take a while.".to_string(),
                ),
                completion: None,
            })],
            Action::CustomOptions => {
                sessions.insert(
                    chat_id.0,
                    Session {
                        step: Step::AwaitingCustomLink,
                        link_template: None,
                        quantity: None,
                        destination: None,
                    },
                );
                vec![reply(
                    "Please send your custom gift link template (e.g., http://t.me/nft/Jackinthemall-):",
                )]
            }
            Action::CustomChat => {
                let Some((template, quantity)) =
                    sessions.get(&chat_id.0).and_then(ready_for_destination)
                else {
                    return vec![reply("Custom link or quantity not set. Please try again.")];
                };
                sessions.remove(&chat_id.0);
                vec![Effect::Sweep(SweepJob {
                    origin: chat_id,
                    target: DeliveryTarget::Conversation(chat_id),
                    upper_bound: quantity,
                    template,
                    announce: Some(
                        "Sending all custom gift links in chat. This may take a while.".to_string(),
                    ),
                    completion: None,
                })]
            }
            Action::CustomChannel => {
                let ready = sessions
                    .get(&chat_id.0)
                    .and_then(ready_for_destination)
                    .is_some();
                match sessions.get_mut(&chat_id.0) {
                    Some(session) if ready => {
                        session.step = Step::AwaitingChannel;
                        vec![reply(
                            "Please enter the channel ID (or @channelusername) where the bot is admin:",
                        )]
                    }
                    _ => vec![reply("Custom link or quantity not set. Please try again.")],
                }
            }
            Action::Unknown => vec![reply("Invalid selection.")],
        }
    }

    /// Feeds free text to the chat's session. Commands and chats without a
    /// session produce nothing.
    pub(super) async fn handle_text(&self, chat_id: ChatId, text: &str) -> Vec<Effect> {
        if text.starts_with('/') {
            return Vec::new();
        }
        let mut sessions = self.store.sessions.lock().await;
        let Some(session) = sessions.get_mut(&chat_id.0) else {
            return Vec::new();
        };

        match session.step {
            Step::AwaitingCustomLink => {
                session.link_template = Some(text.trim().to_string());
                session.step = Step::AwaitingCustomQuantity;
                vec![reply(
                    "Please enter the quantity for your custom gift links (e.g., 100000 or 500000):",
                )]
            }
            Step::AwaitingCustomQuantity => match parse_quantity(text) {
                Some(quantity) => {
                    session.quantity = Some(quantity);
                    session.step = Step::CustomChoiceMade;
                    vec![reply_with(
                        "Choose how you want to send your custom gift links:",
                        build_destination_menu(),
                    )]
                }
                None => vec![reply("Invalid quantity. Please enter a positive number.")],
            },
            Step::AwaitingChannel => {
                let destination = text.trim();
                if destination.is_empty() {
                    return vec![reply(
                        "Please enter the channel ID (or @channelusername) where the bot is admin:",
                    )];
                }
                session.destination = Some(destination.to_string());
                let job = channel_sweep(chat_id, session);
                sessions.remove(&chat_id.0);
                match job {
                    Some(job) => vec![Effect::Sweep(job)],
                    None => vec![reply("Custom link or quantity not set. Please try again.")],
                }
            }
            Step::CustomChoiceMade => Vec::new(),
        }
    }
}

fn channel_sweep(origin: ChatId, session: &Session) -> Option<SweepJob> {
    let (template, quantity) = ready_for_destination(session)?;
    let destination = session.destination.clone()?;
    Some(SweepJob {
        origin,
        announce: Some(format!(
            "Posting to channel {}. Ensure the bot is admin there.",
            destination
        )),
        completion: Some("Done posting to channel.".to_string()),
        target: DeliveryTarget::External(destination),
        upper_bound: quantity,
        template,
    })
}

fn ready_for_destination(session: &Session) -> Option<(String, u64)> {
    let template = session.link_template.clone()?;
    let quantity = session.quantity?;
    Some((template, quantity))
}

pub(super) fn parse_quantity(text: &str) -> Option<u64> {
    text.trim().parse::<u64>().ok().filter(|quantity| *quantity > 0)
}
