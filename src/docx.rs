//! Minimal WordprocessingML writer for the report documents.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::DocumentError;
use crate::report::{ActivityRecord, ActivitySummary, GroupRecord, LikerRecord, PostInfo, UserInfo};

pub const ACTIVITY_PREFIX: &str = "Активность";
pub const LIKERS_PREFIX: &str = "Лайкнувшие";
pub const GROUPS_PREFIX: &str = "Анализ_групп";

const MAX_NAME_ATTEMPTS: usize = 100;

/// Renders report data into a document file and returns its path. The caller
/// owns the file and deletes it once sent.
pub trait DocumentWriter: Send + Sync {
    fn write_activity(&self, user: &UserInfo, posts: &[ActivityRecord]) -> Result<PathBuf, DocumentError>;

    fn write_likers(&self, post: &PostInfo, likers: &[LikerRecord]) -> Result<PathBuf, DocumentError>;

    fn write_group_report(&self, groups: &[GroupRecord]) -> Result<PathBuf, DocumentError>;
}

pub struct DocxWriter {
    output_dir: PathBuf,
    timezone: Tz,
}

impl DocxWriter {
    pub fn new(output_dir: PathBuf, timezone: Tz) -> Self {
        Self { output_dir, timezone }
    }

    fn save(&self, prefix: &str, doc: &Document) -> Result<PathBuf, DocumentError> {
        fs::create_dir_all(&self.output_dir)?;
        let stem = file_stem(prefix, Utc::now().with_timezone(&self.timezone));
        let (path, file) = create_unique(&self.output_dir, &stem)?;

        if let Err(err) = doc.write_to(file) {
            let _ = fs::remove_file(&path);
            return Err(err);
        }
        debug!(path = %path.display(), "Document written");
        Ok(path)
    }
}

impl DocumentWriter for DocxWriter {
    fn write_activity(&self, user: &UserInfo, posts: &[ActivityRecord]) -> Result<PathBuf, DocumentError> {
        let summary = ActivitySummary::from_records(posts);
        let mut doc = Document::default();

        doc.title("Анализ активности пользователя");
        doc.empty();
        doc.labeled("👤 Пользователь: ", &user.name);
        doc.labeled("🔗 Профиль: ", &user.link);
        doc.labeled("👥 Группа: ", &user.group_name);
        doc.empty();

        doc.heading(2, "📊 Сводка");
        doc.paragraph(&format!("Всего постов: {}", summary.total));
        doc.paragraph(&format!("Лайков: {}", summary.liked));
        doc.paragraph(&format!("Репостов: {}", summary.reposted));
        doc.paragraph(&format!("Активность: {}", summary.percent()));
        doc.empty();

        doc.heading(2, "📝 Детали по постам");
        for (i, post) in posts.iter().enumerate() {
            doc.runs(vec![
                Run::bold(format!("{}. {}", i + 1, post.date)),
                Run::plain(format!("\nСсылка: {}", post.link)),
                Run::plain(format!("\nЛайк: {}", yes_no(post.liked))),
                Run::plain(format!("\nРепост: {}", yes_no(post.reposted))),
            ]);
            doc.empty();
        }

        self.save(ACTIVITY_PREFIX, &doc)
    }

    fn write_likers(&self, post: &PostInfo, likers: &[LikerRecord]) -> Result<PathBuf, DocumentError> {
        let mut doc = Document::default();

        doc.title("Список лайкнувших пост");
        doc.empty();
        doc.runs(vec![
            Run::plain("🔗 Ссылка на пост: "),
            Run::underlined(post.link.clone()),
        ]);
        doc.paragraph(&format!("👥 Всего лайков: {}", likers.len()));
        doc.empty();

        doc.heading(2, "📝 Список пользователей");
        for (i, liker) in likers.iter().enumerate() {
            doc.runs(vec![
                Run::bold(format!("{}. ", i + 1)),
                Run::plain(liker.name.clone()),
                Run::plain(format!(" — {}", liker.link)),
            ]);
        }

        self.save(LIKERS_PREFIX, &doc)
    }

    fn write_group_report(&self, groups: &[GroupRecord]) -> Result<PathBuf, DocumentError> {
        let mut doc = Document::default();

        doc.title("Анализ групп Вконтакте");
        doc.empty();
        for (i, group) in groups.iter().enumerate() {
            doc.heading(2, &format!("{}. {}", i + 1, group.display_name()));
            doc.labeled("Участников: ", &group.members_display());
            doc.labeled("Среднее количество лайков: ", &group.avg_likes_display());
            if let Some(desc) = group.description_trimmed() {
                doc.labeled("Описание: ", desc);
            }
            doc.empty();
        }

        self.save(GROUPS_PREFIX, &doc)
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "✅ Да"
    } else {
        "❌ Нет"
    }
}

/// `<prefix>_<dd-mm-YYYY_HH-MM>`
pub fn file_stem(prefix: &str, now: DateTime<Tz>) -> String {
    format!("{}_{}", prefix, now.format("%d-%m-%Y_%H-%M"))
}

/// Creates `<stem>.docx`, or `<stem>_2.docx`, `<stem>_3.docx`, ... when taken.
fn create_unique(dir: &Path, stem: &str) -> io::Result<(PathBuf, File)> {
    for attempt in 1..=MAX_NAME_ATTEMPTS {
        let name = if attempt == 1 {
            format!("{}.docx", stem)
        } else {
            format!("{}_{}.docx", stem, attempt)
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for {}", stem),
    ))
}

struct Run {
    text: String,
    bold: bool,
    underline: bool,
}

impl Run {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: false,
            underline: false,
        }
    }

    fn bold(text: impl Into<String>) -> Self {
        Self {
            bold: true,
            ..Self::plain(text)
        }
    }

    fn underlined(text: impl Into<String>) -> Self {
        Self {
            underline: true,
            ..Self::plain(text)
        }
    }

    fn to_xml(&self) -> String {
        let mut xml = String::from("<w:r>");
        if self.bold || self.underline {
            xml.push_str("<w:rPr>");
            if self.bold {
                xml.push_str("<w:b/>");
            }
            if self.underline {
                xml.push_str(r#"<w:u w:val="single"/>"#);
            }
            xml.push_str("</w:rPr>");
        }
        let pieces: Vec<String> = self
            .text
            .split('\n')
            .map(|line| format!(r#"<w:t xml:space="preserve">{}</w:t>"#, escape_xml_text(line)))
            .collect();
        xml.push_str(&pieces.join("<w:br/>"));
        xml.push_str("</w:r>");
        xml
    }
}

enum Block {
    Heading { level: u8, text: String, centered: bool },
    Paragraph(Vec<Run>),
}

#[derive(Default)]
struct Document {
    blocks: Vec<Block>,
}

impl Document {
    fn title(&mut self, text: &str) {
        self.blocks.push(Block::Heading {
            level: 1,
            text: text.to_string(),
            centered: true,
        });
    }

    fn heading(&mut self, level: u8, text: &str) {
        self.blocks.push(Block::Heading {
            level,
            text: text.to_string(),
            centered: false,
        });
    }

    fn paragraph(&mut self, text: &str) {
        self.runs(vec![Run::plain(text)]);
    }

    fn labeled(&mut self, label: &str, value: &str) {
        self.runs(vec![Run::bold(label), Run::plain(value)]);
    }

    fn empty(&mut self) {
        self.runs(Vec::new());
    }

    fn runs(&mut self, runs: Vec<Run>) {
        self.blocks.push(Block::Paragraph(runs));
    }

    fn body_xml(&self) -> String {
        let mut xml = String::new();
        for block in &self.blocks {
            match block {
                Block::Heading { level, text, centered } => {
                    xml.push_str(&format!(r#"<w:p><w:pPr><w:pStyle w:val="Heading{}"/>"#, level));
                    if *centered {
                        xml.push_str(r#"<w:jc w:val="center"/>"#);
                    }
                    xml.push_str("</w:pPr>");
                    xml.push_str(&Run::plain(text.as_str()).to_xml());
                    xml.push_str("</w:p>");
                }
                Block::Paragraph(runs) => {
                    xml.push_str("<w:p>");
                    for run in runs {
                        xml.push_str(&run.to_xml());
                    }
                    xml.push_str("</w:p>");
                }
            }
        }
        xml
    }

    fn document_xml(&self) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
                "<w:body>{}<w:sectPr/></w:body></w:document>"
            ),
            self.body_xml()
        )
    }

    fn write_to(&self, file: File) -> Result<(), DocumentError> {
        let mut writer = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let parts = [
            ("[Content_Types].xml", CONTENT_TYPES_XML.to_string()),
            ("_rels/.rels", PACKAGE_RELS_XML.to_string()),
            ("word/_rels/document.xml.rels", DOCUMENT_RELS_XML.to_string()),
            ("word/styles.xml", STYLES_XML.to_string()),
            ("word/document.xml", self.document_xml()),
        ];
        for (name, content) in parts {
            writer.start_file(name, options)?;
            writer.write_all(content.as_bytes())?;
        }
        writer.finish()?;
        Ok(())
    }
}

fn escape_xml_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

const CONTENT_TYPES_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    r#"<Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>"#,
    "</Types>"
);

const PACKAGE_RELS_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    "</Relationships>"
);

const DOCUMENT_RELS_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
    "</Relationships>"
);

const STYLES_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
    r#"<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/>"#,
    r#"<w:rPr><w:sz w:val="22"/></w:rPr></w:style>"#,
    r#"<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/>"#,
    r#"<w:next w:val="Normal"/><w:pPr><w:spacing w:before="240" w:after="120"/><w:outlineLvl w:val="0"/></w:pPr>"#,
    r#"<w:rPr><w:b/><w:sz w:val="32"/></w:rPr></w:style>"#,
    r#"<w:style w:type="paragraph" w:styleId="Heading2"><w:name w:val="heading 2"/><w:basedOn w:val="Normal"/>"#,
    r#"<w:next w:val="Normal"/><w:pPr><w:spacing w:before="200" w:after="80"/><w:outlineLvl w:val="1"/></w:pPr>"#,
    r#"<w:rPr><w:b/><w:sz w:val="26"/></w:rPr></w:style>"#,
    "</w:styles>"
);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Read;
    use zip::ZipArchive;

    fn read_document_xml(path: &Path) -> String {
        let file = File::open(path).unwrap();
        let mut archive = ZipArchive::new(file).unwrap();
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        xml
    }

    fn writer_in(dir: &tempfile::TempDir) -> DocxWriter {
        DocxWriter::new(dir.path().to_path_buf(), chrono_tz::UTC)
    }

    #[test]
    fn test_file_stem() {
        let now = chrono_tz::Europe::Moscow.with_ymd_and_hms(2024, 3, 7, 9, 5, 0).unwrap();
        assert_eq!(file_stem(LIKERS_PREFIX, now), "Лайкнувшие_07-03-2024_09-05");
    }

    #[test]
    fn taken_names_get_a_numeric_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _) = create_unique(dir.path(), "report").unwrap();
        let (second, _) = create_unique(dir.path(), "report").unwrap();
        let (third, _) = create_unique(dir.path(), "report").unwrap();
        assert_eq!(first.file_name().unwrap(), "report.docx");
        assert_eq!(second.file_name().unwrap(), "report_2.docx");
        assert_eq!(third.file_name().unwrap(), "report_3.docx");
    }

    #[test]
    fn likers_document_contains_every_liker() {
        let dir = tempfile::tempdir().unwrap();
        let likers: Vec<LikerRecord> = (1..=120)
            .map(|i| LikerRecord {
                name: format!("Liker {}", i),
                link: format!("https://vk.com/id{}", i),
            })
            .collect();
        let post = PostInfo {
            link: "https://vk.com/wall-1_2".to_string(),
        };

        let path = writer_in(&dir).write_likers(&post, &likers).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("Лайкнувшие_"), "name: {}", name);
        assert!(name.ends_with(".docx"));

        let xml = read_document_xml(&path);
        assert!(xml.contains("Список лайкнувших пост"));
        assert!(xml.contains("👥 Всего лайков: 120"));
        for i in 1..=120 {
            assert!(xml.contains(&format!(">Liker {}<", i)), "missing liker {}", i);
        }
        assert!(xml.contains(r#"<w:u w:val="single"/>"#));
    }

    #[test]
    fn activity_document_has_summary_and_all_posts() {
        let dir = tempfile::tempdir().unwrap();
        let user = UserInfo {
            name: "Иван <Петров> & Co".to_string(),
            link: "https://vk.com/id200".to_string(),
            group_name: "Группа".to_string(),
        };
        let posts: Vec<ActivityRecord> = (1..=30)
            .map(|i| ActivityRecord {
                date: "01.01.2024 10:00".to_string(),
                link: format!("https://vk.com/wall-100_{}", i),
                liked: i % 3 == 0,
                reposted: i == 1,
            })
            .collect();

        let path = writer_in(&dir).write_activity(&user, &posts).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("Активность_"));

        let xml = read_document_xml(&path);
        assert!(xml.contains("Иван &lt;Петров&gt; &amp; Co"));
        assert!(xml.contains("Всего постов: 30"));
        assert!(xml.contains("Лайков: 10"));
        assert!(xml.contains("Репостов: 1"));
        assert!(xml.contains("Активность: 36.7%"));
        assert!(xml.contains("Ссылка: https://vk.com/wall-100_30"));
        assert!(xml.contains("<w:br/>"));
    }

    #[test]
    fn group_report_document() {
        let dir = tempfile::tempdir().unwrap();
        let groups = vec![GroupRecord {
            name: Some("Клуб".to_string()),
            members: Some(10),
            avg_likes: None,
            description: None,
        }];
        let path = writer_in(&dir).write_group_report(&groups).unwrap();
        let xml = read_document_xml(&path);
        assert!(xml.contains("Анализ групп Вконтакте"));
        assert!(xml.contains("1. Клуб"));
        assert!(!xml.contains("Описание"));
    }
}
