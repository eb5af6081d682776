//! Structured report records and their chat renderings.
//!
//! Chat text uses Discord markdown: `**bold**`, masked links `[name](<url>)`
//! and bare links wrapped in `<...>` so the client does not unfurl them.

use std::sync::OnceLock;

use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serenity::utils::{EmbedMessageBuilding, MessageBuilder};

use crate::link_parser::PostRef;
use crate::vk_api::Liker;

/// Likers listed in the chat message; the document always has all of them.
pub const CHAT_LIKERS_LIMIT: usize = 50;
/// Example posts listed per section of the activity message.
pub const CHAT_EXAMPLES_LIMIT: usize = 10;

pub const DATE_FORMAT: &str = "%d.%m.%Y %H:%M";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikerRecord {
    pub name: String,
    pub link: String,
}

impl LikerRecord {
    pub fn from_liker(liker: &Liker) -> Self {
        Self {
            name: liker.display_name(),
            link: liker.profile_url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRecord {
    pub date: String,
    pub link: String,
    pub liked: bool,
    pub reposted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostInfo {
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub name: String,
    pub link: String,
    pub group_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupRecord {
    pub name: Option<String>,
    pub members: Option<u64>,
    pub avg_likes: Option<f64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySummary {
    pub total: usize,
    pub liked: usize,
    pub reposted: usize,
}

impl ActivitySummary {
    pub fn from_records(records: &[ActivityRecord]) -> Self {
        Self {
            total: records.len(),
            liked: records.iter().filter(|r| r.liked).count(),
            reposted: records.iter().filter(|r| r.reposted).count(),
        }
    }

    pub fn activity(&self) -> usize {
        self.liked + self.reposted
    }

    pub fn percent(&self) -> String {
        activity_percent(self.liked, self.reposted, self.total)
    }
}

/// `(liked + reposted) / total * 100` with one decimal, or `0%` without posts.
pub fn activity_percent(liked: usize, reposted: usize, total: usize) -> String {
    if total == 0 {
        return "0%".to_string();
    }
    let percent = (liked + reposted) as f64 / total as f64 * 100.0;
    format!("{:.1}%", percent)
}

pub fn format_post_date(unix_seconds: i64, timezone: Tz) -> String {
    match Utc.timestamp_opt(unix_seconds, 0).single() {
        Some(time) => time.with_timezone(&timezone).format(DATE_FORMAT).to_string(),
        None => "—".to_string(),
    }
}

fn more_people(hidden: usize) -> String {
    format!("...и еще {} человек", hidden)
}

fn more_posts(hidden: usize) -> String {
    format!("...и еще {} постов", hidden)
}

/// Escapes markdown in `text` that comes from VK so it renders literally.
fn markdown_safe(text: &str) -> String {
    MessageBuilder::new().push_safe(text).build()
}

pub fn render_likers_message(post: &PostRef, likers: &[LikerRecord]) -> String {
    let count = likers.len();
    let mut message = MessageBuilder::new();
    message
        .push_bold_line(format!("📊 Лайкнули пост: {} человек", count))
        .push_line("")
        .push_bold_line("Ссылка на пост:")
        .push_line(format!("<{}>", post.url()))
        .push_line("")
        .push_bold_line("Список лайкнувших:");

    for (i, liker) in likers.iter().take(CHAT_LIKERS_LIMIT).enumerate() {
        message
            .push(format!("{}. ", i + 1))
            .push_named_link_safe(markdown_safe(&liker.name), format!("<{}>", liker.link))
            .push_line("");
    }
    if count > CHAT_LIKERS_LIMIT {
        message.push_line("").push(more_people(count - CHAT_LIKERS_LIMIT));
    }

    message.build().trim_end().to_string()
}

fn push_examples(message: &mut MessageBuilder, title: &str, records: &[&ActivityRecord]) {
    message.push_bold_line(format!("{} ({}):", title, records.len()));
    for record in records.iter().take(CHAT_EXAMPLES_LIMIT) {
        message.push_line(format!("• Пост от {} (<{}>)", record.date, record.link));
    }
    if records.len() > CHAT_EXAMPLES_LIMIT {
        message.push_line(more_posts(records.len() - CHAT_EXAMPLES_LIMIT));
    }
    message.push_line("");
}

pub fn render_activity_message(records: &[ActivityRecord]) -> String {
    let summary = ActivitySummary::from_records(records);
    let liked: Vec<&ActivityRecord> = records.iter().filter(|r| r.liked).collect();
    let reposted: Vec<&ActivityRecord> = records.iter().filter(|r| r.reposted).collect();

    let mut message = MessageBuilder::new();
    message
        .push_bold_line("📊 Анализ завершён!")
        .push_line("")
        .push_bold_line("Статистика:")
        .push("• Проверено постов: ")
        .push_bold_line(summary.total)
        .push("• Лайков: ")
        .push_bold_line(summary.liked)
        .push("• Репостов: ")
        .push_bold_line(summary.reposted)
        .push("• Всего активности: ")
        .push_bold_line(summary.activity())
        .push("• Процент активности: ")
        .push_bold_line(summary.percent())
        .push_line("");

    if !liked.is_empty() {
        push_examples(&mut message, "❤️ Лайкнутые посты", &liked);
    }
    if !reposted.is_empty() {
        push_examples(&mut message, "🔄 Репосты", &reposted);
    }
    if liked.is_empty() && reposted.is_empty() {
        message
            .push("😴 Пользователь ")
            .push_bold("ничего не лайкал и не репостил")
            .push(".");
    }

    message.build().trim_end().to_string()
}

/// Plain-text listing of groups, one block per group.
#[allow(dead_code)]
pub fn render_group_report_text(groups: &[GroupRecord]) -> String {
    let mut lines = vec![
        "АНАЛИЗ ГРУПП ВКОНТАКТЕ".to_string(),
        "=".repeat(40),
        String::new(),
    ];

    for (i, group) in groups.iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, group.display_name()));
        lines.push(format!("   Участников: {}", group.members_display()));
        lines.push(format!("   Ср. лайков: {}", group.avg_likes_display()));
        if let Some(desc) = group.description_trimmed() {
            lines.push(format!("   Описание: {}", desc));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

#[allow(dead_code)]
impl GroupRecord {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Без названия")
    }

    pub fn members_display(&self) -> String {
        self.members.map(|m| m.to_string()).unwrap_or_else(|| "—".to_string())
    }

    pub fn avg_likes_display(&self) -> String {
        self.avg_likes
            .map(|avg| format!("{:.1}", avg))
            .unwrap_or_else(|| "—".to_string())
    }

    pub fn description_trimmed(&self) -> Option<&str> {
        self.description.as_deref().map(str::trim).filter(|d| !d.is_empty())
    }
}

fn html_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^<]+?>").expect("valid tag regex"))
}

fn masked_link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[([^\]]*)\]\(<?([^)>]*)>?\)").expect("valid link regex"))
}

fn escaped_char_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\\([*_`~|\\])").expect("valid escape regex"))
}

fn bare_link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<(https?://[^>\s]+)>").expect("valid link regex"))
}

/// Reduces chat markup to plain text for the operator relay.
pub fn strip_markup(text: &str) -> String {
    let text = masked_link_pattern().replace_all(text, "$1 ($2)");
    let text = bare_link_pattern().replace_all(&text, "$1");
    let text = html_tag_pattern().replace_all(&text, "");
    let text = text.replace("**", "");
    escaped_char_pattern()
        .replace_all(&text, "$1")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vk_api::LikerKind;

    fn likers(n: usize) -> Vec<LikerRecord> {
        (1..=n)
            .map(|i| LikerRecord {
                name: format!("User {}", i),
                link: format!("https://vk.com/id{}", i),
            })
            .collect()
    }

    fn record(i: usize, liked: bool, reposted: bool) -> ActivityRecord {
        ActivityRecord {
            date: "01.02.2024 10:00".to_string(),
            link: format!("https://vk.com/wall-1_{}", i),
            liked,
            reposted,
        }
    }

    #[test]
    fn test_activity_percent() {
        let test_cases = vec![
            ((0, 0, 0), "0%"),
            ((0, 0, 30), "0.0%"),
            ((3, 0, 30), "10.0%"),
            ((1, 1, 3), "66.7%"),
            ((30, 30, 30), "200.0%"),
            ((1, 0, 8), "12.5%"),
        ];
        for ((liked, reposted, total), expected) in test_cases {
            assert_eq!(activity_percent(liked, reposted, total), expected);
        }
    }

    #[test]
    fn test_format_post_date_uses_timezone() {
        // 2024-01-01T00:00:00Z
        let ts = 1_704_067_200;
        assert_eq!(format_post_date(ts, chrono_tz::UTC), "01.01.2024 00:00");
        assert_eq!(format_post_date(ts, chrono_tz::Europe::Moscow), "01.01.2024 03:00");
    }

    #[test]
    fn test_liker_record_from_api() {
        let liker = Liker {
            id: 42,
            kind: LikerKind::Profile,
            first_name: "Анна".to_string(),
            last_name: "Смирнова".to_string(),
            name: String::new(),
        };
        let record = LikerRecord::from_liker(&liker);
        assert_eq!(record.name, "Анна Смирнова");
        assert_eq!(record.link, "https://vk.com/id42");

        let community = Liker {
            id: 77,
            kind: LikerKind::Page,
            first_name: String::new(),
            last_name: String::new(),
            name: "Новости района".to_string(),
        };
        let record = LikerRecord::from_liker(&community);
        assert_eq!(record.name, "Новости района");
        assert_eq!(record.link, "https://vk.com/club77");
    }

    #[test]
    fn likers_message_lists_everyone_up_to_limit() {
        let post = PostRef { owner_id: -1, post_id: 2 };
        let message = render_likers_message(&post, &likers(50));
        assert!(message.contains("Лайкнули пост: 50 человек"));
        assert!(message.contains("<https://vk.com/wall-1_2>"));
        assert!(message.contains("50. [User 50](<https://vk.com/id50>)"));
        assert!(!message.contains("...и еще"));
    }

    #[test]
    fn likers_message_truncates_past_limit() {
        let post = PostRef { owner_id: -1, post_id: 2 };
        let message = render_likers_message(&post, &likers(73));
        assert!(message.contains("Лайкнули пост: 73 человек"));
        assert!(message.contains("50. [User 50]"));
        assert!(!message.contains("51. [User 51]"));
        assert!(message.ends_with("...и еще 23 человек"));
    }

    #[test]
    fn likers_message_escapes_vk_names() {
        let post = PostRef { owner_id: -1, post_id: 2 };
        let likers = vec![LikerRecord {
            name: "*Ма_ша* [VIP] `x`".to_string(),
            link: "https://vk.com/id1".to_string(),
        }];
        let message = render_likers_message(&post, &likers);

        let line = message.lines().find(|l| l.starts_with("1. [")).unwrap();
        assert!(line.ends_with("](<https://vk.com/id1>)"), "{}", line);
        assert_eq!(line.matches(']').count(), 1, "{}", line);
        for (i, c) in line.char_indices() {
            if matches!(c, '*' | '_' | '`') {
                assert_eq!(&line[i - 1..i], "\\", "unescaped {:?} in {}", c, line);
            }
        }

        let plain = strip_markup(&message);
        assert!(plain.contains("1. *Ма_ша*"), "{}", plain);
        assert!(plain.contains("(https://vk.com/id1)"), "{}", plain);
    }

    #[test]
    fn activity_message_counts_and_examples() {
        let mut records: Vec<ActivityRecord> = (1..=12).map(|i| record(i, true, false)).collect();
        records.push(record(13, false, true));
        records.push(record(14, false, false));

        let message = render_activity_message(&records);
        assert!(message.contains("• Проверено постов: **14**"));
        assert!(message.contains("• Лайков: **12**"));
        assert!(message.contains("• Репостов: **1**"));
        assert!(message.contains("• Всего активности: **13**"));
        assert!(message.contains("• Процент активности: **92.9%**"));
        assert!(message.contains("**❤️ Лайкнутые посты (12):**"));
        assert!(message.contains("wall-1_10>"));
        assert!(!message.contains("wall-1_11>"));
        assert!(message.contains("...и еще 2 постов"));
        assert!(message.contains("**🔄 Репосты (1):**"));
        assert!(!message.contains("ничего не лайкал"));
    }

    #[test]
    fn activity_message_without_activity() {
        let records: Vec<ActivityRecord> = (1..=3).map(|i| record(i, false, false)).collect();
        let message = render_activity_message(&records);
        assert!(message.contains("• Процент активности: **0.0%**"));
        assert!(message.ends_with("😴 Пользователь **ничего не лайкал и не репостил**."));
        assert!(!message.contains("Лайкнутые посты"));
    }

    #[test]
    fn activity_message_with_no_posts_reports_zero_percent() {
        let message = render_activity_message(&[]);
        assert!(message.contains("• Процент активности: **0%**"));
    }

    #[test]
    fn group_report_text_layout() {
        let groups = vec![
            GroupRecord {
                name: Some("Клуб".to_string()),
                members: Some(1200),
                avg_likes: Some(14.27),
                description: Some("  Про всё  ".to_string()),
            },
            GroupRecord {
                name: None,
                members: None,
                avg_likes: None,
                description: Some("   ".to_string()),
            },
        ];
        let text = render_group_report_text(&groups);
        let expected = "АНАЛИЗ ГРУПП ВКОНТАКТЕ\n\
            ========================================\n\
            \n\
            1. Клуб\n   Участников: 1200\n   Ср. лайков: 14.3\n   Описание: Про всё\n\
            \n\
            2. Без названия\n   Участников: —\n   Ср. лайков: —\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn strip_markup_leaves_plain_text() {
        let text = "**📊 Лайкнули пост: 1 человек**\n1. [Ан\\_на](<https://vk.com/id1>) <https://vk.com/wall-1_2> <b>x</b> a&amp;b";
        assert_eq!(
            strip_markup(text),
            "📊 Лайкнули пост: 1 человек\n1. Ан_на (https://vk.com/id1) https://vk.com/wall-1_2 x a&b"
        );
    }
}
