use super::*;
use async_trait::async_trait;
use teloxide::{ApiError, RequestError};

#[derive(Debug, thiserror::Error)]
pub(super) enum SendError {
    #[error("rate limited")]
    RateLimited(Option<Duration>),
    #[error(transparent)]
    Other(anyhow::Error),
}

impl From<RequestError> for SendError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::RetryAfter(wait) => SendError::RateLimited(Some(wait)),
            RequestError::Api(ApiError::Unknown(text)) if text.contains("Too Many Requests") => {
                SendError::RateLimited(None)
            }
            other => SendError::Other(other.into()),
        }
    }
}

/// Outbound half of the messaging platform.
#[async_trait]
pub(super) trait Transport: Send + Sync {
    async fn send(
        &self,
        recipient: &Recipient,
        text: &str,
        options: &SendOptions,
    ) -> std::result::Result<(), SendError>;
}

pub(super) struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub(super) fn new(bot: Bot) -> Self {
        TelegramTransport { bot }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(
        &self,
        recipient: &Recipient,
        text: &str,
        options: &SendOptions,
    ) -> std::result::Result<(), SendError> {
        let mut request = self.bot.send_message(recipient.clone(), text);
        if let Some(mode) = options.format.parse_mode() {
            request = request.parse_mode(mode);
        }
        if let Some(keyboard) = options.keyboard.clone() {
            request = request.reply_markup(keyboard);
        }
        request.await?;
        Ok(())
    }
}

impl DeliveryTarget {
    pub(super) fn recipient(&self) -> Recipient {
        match self {
            DeliveryTarget::Conversation(chat_id) => Recipient::Id(*chat_id),
            DeliveryTarget::External(raw) => parse_recipient(raw),
        }
    }
}

/// Numeric ids go to that chat; anything else is a channel username.
pub(super) fn parse_recipient(raw: &str) -> Recipient {
    let trimmed = raw.trim();
    if let Ok(id) = trimmed.parse::<i64>() {
        return Recipient::Id(ChatId(id));
    }
    if trimmed.starts_with('@') {
        Recipient::ChannelUsername(trimmed.to_string())
    } else {
        Recipient::ChannelUsername(format!("@{}", trimmed))
    }
}

#[derive(Debug, Clone)]
pub(super) struct DeliverySettings {
    pub(super) block_size: u64,
    pub(super) chat_delay: Duration,
    pub(super) channel_delay: Duration,
    pub(super) rate_limit_default: Duration,
    pub(super) render: RenderOptions,
}

impl DeliverySettings {
    pub(super) fn from_config(config: &Config) -> Self {
        DeliverySettings {
            block_size: config.block_size,
            chat_delay: config.chat_delay,
            channel_delay: config.channel_delay,
            rate_limit_default: config.rate_limit_default,
            render: RenderOptions {
                format: config.text_format,
                decorate: config.decorate_indices,
            },
        }
    }

    fn pacing(&self, target: &DeliveryTarget) -> Duration {
        match target {
            DeliveryTarget::Conversation(_) => self.chat_delay,
            DeliveryTarget::External(_) => self.channel_delay,
        }
    }
}

pub(super) struct Delivery {
    transport: Arc<dyn Transport>,
    settings: DeliverySettings,
}

impl Delivery {
    pub(super) fn new(transport: Arc<dyn Transport>, settings: DeliverySettings) -> Self {
        Delivery {
            transport,
            settings,
        }
    }

    /// Sends once, waiting out rate-limit rejections for as long as they last.
    pub(super) async fn send_with_retry(
        &self,
        recipient: &Recipient,
        text: &str,
        options: &SendOptions,
    ) -> Result<()> {
        loop {
            match self.transport.send(recipient, text, options).await {
                Ok(()) => return Ok(()),
                Err(SendError::RateLimited(hint)) => {
                    let wait = hint.unwrap_or(self.settings.rate_limit_default);
                    warn!(
                        "rate limited sending to {:?}; retrying in {}s",
                        recipient,
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(SendError::Other(err)) => {
                    return Err(err.context(format!("send to {:?}", recipient)));
                }
            }
        }
    }

    pub(super) async fn deliver_one(
        &self,
        target: &DeliveryTarget,
        range: &LinkRange,
        template: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<()> {
        let text = render_block(range, template, &self.settings.render);
        let parts = split_message(&text, MESSAGE_BUDGET);
        let recipient = target.recipient();
        let last = parts.len().saturating_sub(1);
        for (index, part) in parts.iter().enumerate() {
            // Navigation buttons belong under the final part only.
            let options = SendOptions {
                format: self.settings.render.format,
                keyboard: if index == last { keyboard.clone() } else { None },
            };
            self.send_with_retry(&recipient, part, &options).await?;
        }
        Ok(())
    }

    /// Delivers every block of `[1, upper_bound]` in order, pacing between sends.
    pub(super) async fn deliver_sweep(&self, job: &SweepJob) -> SweepReport {
        let origin = Recipient::Id(job.origin);
        if let Some(announce) = &job.announce {
            if let Err(err) = self
                .send_with_retry(&origin, announce, &SendOptions::plain())
                .await
            {
                error!("sweep announcement failed: {:#}", err);
            }
        }

        let pacing = self.settings.pacing(&job.target);
        let mut report = SweepReport::default();
        let mut first = true;
        for range in sweep_ranges(self.settings.block_size, job.upper_bound) {
            if !first {
                tokio::time::sleep(pacing).await;
            }
            first = false;

            match self
                .deliver_one(&job.target, &range, &job.template, None)
                .await
            {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    error!(
                        "block {}-{} to {:?} failed: {:#}",
                        range.start, range.end, job.target, err
                    );
                }
            }
        }

        if let Some(completion) = &job.completion {
            if let Err(err) = self
                .send_with_retry(&origin, completion, &SendOptions::plain())
                .await
            {
                error!("sweep completion notice failed: {:#}", err);
            }
        }
        report
    }
}
