use super::*;

pub(super) async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> Result<()> {
    // Acknowledge first; the effects below may wait out rate limits.
    if let Err(err) = bot.answer_callback_query(q.id.clone()).await {
        warn!("answer callback failed: {}", err);
    }

    let Some(message) = q.message.as_ref() else {
        return Ok(());
    };
    let chat_id = message.chat.id;
    let actor = Actor::from(&q.from);
    state.users.record(&actor).await;

    let action = Action::parse(q.data.as_deref().unwrap_or_default());
    let effects = state
        .conversation
        .handle_action(chat_id, &actor, action)
        .await;
    run_effects(&state, chat_id, effects).await;
    Ok(())
}
