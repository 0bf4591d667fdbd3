use super::*;
use teloxide::utils::markdown;

const KEYCAP_SUFFIX: &str = "\u{FE0F}\u{20E3}";

/// Spells a number with keycap digit glyphs, e.g. `12` -> `1️⃣2️⃣`.
pub(super) fn keycap_digits(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() * 7);
    for digit in digits.chars() {
        out.push(digit);
        out.push_str(KEYCAP_SUFFIX);
    }
    out
}

fn index_label(value: u64, decorate: bool) -> String {
    if decorate {
        keycap_digits(value)
    } else {
        value.to_string()
    }
}

fn header_line(range: &LinkRange, options: &RenderOptions) -> String {
    let title = format!(
        "🎁 {} to {}",
        index_label(range.start, options.decorate),
        index_label(range.end, options.decorate)
    );
    match options.format {
        TextFormat::Plain => title,
        TextFormat::Markdown => markdown::bold(&markdown::escape(&title)),
        TextFormat::Html => format!("<b>{}</b>", title),
    }
}

/// Renders one block: a header and one link line per index in the range.
pub(super) fn render_block(range: &LinkRange, template: &str, options: &RenderOptions) -> String {
    let template = match options.format {
        TextFormat::Html => html_escape::encode_text(template).into_owned(),
        TextFormat::Markdown => markdown::escape(template),
        TextFormat::Plain => template.to_string(),
    };

    let mut lines = Vec::with_capacity((range.end - range.start + 2) as usize);
    lines.push(header_line(range, options));
    for index in range.start..=range.end {
        lines.push(format!(
            "{} {}{}",
            index_label(index, options.decorate),
            template,
            index
        ));
    }
    lines.join("\n")
}

fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Packs whole lines into messages of at most `budget` UTF-16 units. A
/// single line longer than the budget is sent on its own.
pub(super) fn split_message(text: &str, budget: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for line in text.lines() {
        let line_len = utf16_len(line);
        let needed = if current.is_empty() { line_len } else { line_len + 1 };
        if !current.is_empty() && current_len + needed > budget {
            parts.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() || parts.is_empty() {
        parts.push(current);
    }
    parts
}

pub(super) fn build_nav_keyboard(range: &LinkRange) -> Option<InlineKeyboardMarkup> {
    let mut row = Vec::new();
    if range.has_next {
        row.push(InlineKeyboardButton::callback(
            "Next",
            Action::DefaultBlock {
                start: range.next_start,
            }
            .token(),
        ));
    }
    if range.has_prev {
        row.push(InlineKeyboardButton::callback(
            "Prev",
            Action::DefaultBlock {
                start: range.prev_start,
            }
            .token(),
        ));
    }
    if row.is_empty() {
        None
    } else {
        Some(InlineKeyboardMarkup::new(vec![row]))
    }
}

pub(super) fn build_main_menu() -> InlineKeyboardMarkup {
    let rows = [
        ("1️⃣ (Jack_in_the_Box_bot)", Action::DefaultBlock { start: 1 }),
        ("2️⃣ (Information 🆔️)", Action::Info),
        ("3️⃣ (Send All Default Gifts in Chat)", Action::SweepDefault),
        ("4️⃣ (Custom Gift Options)", Action::CustomOptions),
    ];
    InlineKeyboardMarkup::new(
        rows.into_iter()
            .map(|(label, action)| vec![InlineKeyboardButton::callback(label, action.token())])
            .collect::<Vec<_>>(),
    )
}

pub(super) fn build_destination_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "Custom Chat",
            Action::CustomChat.token(),
        )],
        vec![InlineKeyboardButton::callback(
            "Custom Channel",
            Action::CustomChannel.token(),
        )],
    ])
}

pub(super) fn info_text(actor: &Actor) -> String {
    format!(
        "Username: {}\nUser ID: {}",
        actor.username.as_deref().unwrap_or("(none)"),
        actor.id
    )
}
