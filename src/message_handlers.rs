use super::*;

pub(super) async fn handle_message(msg: Message, state: Arc<AppState>) -> Result<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    state.users.record(&Actor::from(user)).await;

    if let Some(cmd) = parse_command(text) {
        handle_command(&state, chat_id, cmd).await;
        return Ok(());
    }

    let effects = state.conversation.handle_text(chat_id, text).await;
    run_effects(&state, chat_id, effects).await;
    Ok(())
}

async fn handle_command(state: &Arc<AppState>, chat_id: ChatId, cmd: &str) {
    match cmd {
        "start" | "menu" => send_main_menu(state, chat_id).await,
        "cancel" => {
            let text = if state.conversation.cancel(chat_id).await {
                "Custom gift setup cancelled."
            } else {
                "Nothing to cancel."
            };
            run_effects(
                state,
                chat_id,
                vec![Effect::Reply {
                    text: text.to_string(),
                    keyboard: None,
                }],
            )
            .await;
        }
        "stop" => {
            let stopped = state.sweeps.cancel_for(chat_id).await;
            let text = match stopped {
                0 => "No sending in progress.".to_string(),
                1 => "Stopped 1 sending task.".to_string(),
                n => format!("Stopped {} sending tasks.", n),
            };
            run_effects(
                state,
                chat_id,
                vec![Effect::Reply {
                    text,
                    keyboard: None,
                }],
            )
            .await;
        }
        _ => {
            // Unknown commands are ignored.
        }
    }
}
