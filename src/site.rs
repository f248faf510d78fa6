use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;
use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::cli::SiteInitArgs;

pub const DEFAULT_LIST_URL: &str =
    "https://findxsyu.libsp.cn/#/elecBook?keyword={keyword}&category={category}&page={page}";

/// How to pull one field out of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub name: String,
    pub selector: String,
    /// Read this attribute instead of the element text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
    /// Resolve the value against the page URL.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub link: bool,
}

impl FieldRule {
    pub fn text(name: &str, selector: &str) -> Self {
        Self {
            name: name.to_owned(),
            selector: selector.to_owned(),
            attr: None,
            link: false,
        }
    }

    pub fn link(name: &str, selector: &str, attr: &str) -> Self {
        Self {
            name: name.to_owned(),
            selector: selector.to_owned(),
            attr: Some(attr.to_owned()),
            link: true,
        }
    }
}

/// Everything that is specific to one target site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteProfile {
    /// Listing URL with `{page}`, `{keyword}` and `{category}` placeholders.
    pub list_url: String,
    #[serde(default = "default_ready_selector")]
    pub ready_selector: String,
    pub item_selector: String,
    #[serde(default = "default_detail_url_field")]
    pub detail_url_field: String,
    pub list_fields: Vec<FieldRule>,
    pub detail_fields: Vec<FieldRule>,
}

fn default_ready_selector() -> String {
    "body".to_owned()
}

fn default_detail_url_field() -> String {
    "detail_url".to_owned()
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            list_url: DEFAULT_LIST_URL.to_owned(),
            ready_selector: default_ready_selector(),
            item_selector: "div.book-item".to_owned(),
            detail_url_field: default_detail_url_field(),
            list_fields: vec![
                FieldRule::text("title", ".book-title"),
                FieldRule::text("author", ".book-author"),
                FieldRule::text("publisher", ".book-publisher"),
                FieldRule::text("isbn", ".book-isbn"),
                FieldRule::text("description", ".book-description"),
                FieldRule::text("category", ".book-category"),
                FieldRule::link("cover_url", ".book-cover img", "src"),
                FieldRule::link("detail_url", "a", "href"),
            ],
            detail_fields: vec![
                FieldRule::text("title", ".detail-title"),
                FieldRule::text("author", ".detail-author"),
                FieldRule::text("publisher", ".detail-publisher"),
                FieldRule::text("isbn", ".detail-isbn"),
                FieldRule::text("publish_date", ".detail-publish-date"),
                FieldRule::text("pages", ".detail-pages"),
                FieldRule::text("language", ".detail-language"),
                FieldRule::text("description", ".detail-description"),
                FieldRule::text("table_of_contents", ".detail-toc"),
                FieldRule::link("cover_image", ".detail-cover img", "src"),
            ],
        }
    }
}

impl SiteProfile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read site profile: {}", path.display()))?;
        serde_yaml::from_str(&yaml)
            .with_context(|| format!("parse site profile: {}", path.display()))
    }

    pub fn load_or_default(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(Path::new(path)),
            None => Ok(Self::default()),
        }
    }

    pub fn compile(&self) -> anyhow::Result<CompiledProfile> {
        if !self.list_url.contains("{page}") {
            anyhow::bail!("list_url must contain a {{page}} placeholder: {}", self.list_url);
        }
        if self.list_fields.is_empty() {
            anyhow::bail!("list_fields must not be empty");
        }
        if !self.detail_fields.is_empty()
            && !self.list_fields.iter().any(|rule| rule.name == self.detail_url_field)
        {
            anyhow::bail!(
                "detail_url_field {:?} is not one of list_fields; detail pages would never be fetched",
                self.detail_url_field
            );
        }

        parse_selector(&self.ready_selector).context("ready_selector")?;
        let item = parse_selector(&self.item_selector).context("item_selector")?;
        let list_fields = compile_fields(&self.list_fields).context("list_fields")?;
        let detail_fields = compile_fields(&self.detail_fields).context("detail_fields")?;

        Ok(CompiledProfile {
            list_url: self.list_url.clone(),
            ready_selector: self.ready_selector.clone(),
            item,
            detail_url_field: self.detail_url_field.clone(),
            list_fields,
            detail_fields,
        })
    }
}

/// A [`SiteProfile`] with every selector parsed up front.
#[derive(Debug, Clone)]
pub struct CompiledProfile {
    pub list_url: String,
    pub ready_selector: String,
    pub item: Selector,
    pub detail_url_field: String,
    pub list_fields: Vec<CompiledField>,
    pub detail_fields: Vec<CompiledField>,
}

#[derive(Debug, Clone)]
pub struct CompiledField {
    pub name: String,
    pub selector: Selector,
    pub attr: Option<String>,
    pub link: bool,
}

impl CompiledProfile {
    pub fn page_url(&self, page: usize, keyword: &str, category: &str) -> String {
        self.list_url
            .replace("{page}", &page.to_string())
            .replace("{keyword}", &encode_query_value(keyword))
            .replace("{category}", &encode_query_value(category))
    }
}

fn compile_fields(rules: &[FieldRule]) -> anyhow::Result<Vec<CompiledField>> {
    rules
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            if rule.name.trim().is_empty() {
                anyhow::bail!("field name must not be empty (selector {:?})", rule.selector);
            }
            if rules[..index].iter().any(|earlier| earlier.name == rule.name) {
                anyhow::bail!("duplicate field name {:?}", rule.name);
            }
            let selector =
                parse_selector(&rule.selector).with_context(|| format!("field {}", rule.name))?;
            Ok(CompiledField {
                name: rule.name.clone(),
                selector,
                attr: rule.attr.clone(),
                link: rule.link,
            })
        })
        .collect()
}

fn parse_selector(selector: &str) -> anyhow::Result<Selector> {
    Selector::parse(selector).map_err(|err| anyhow::anyhow!("invalid selector {selector:?}: {err}"))
}

fn encode_query_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

pub fn init(args: SiteInitArgs) -> anyhow::Result<()> {
    let out_path = Path::new(&args.out);
    if out_path.exists() && !args.force {
        anyhow::bail!("site profile already exists: {}", out_path.display());
    }
    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create site profile dir: {}", parent.display()))?;
    }

    let yaml = serde_yaml::to_string(&SiteProfile::default()).context("serialize site profile")?;

    let mut options = OpenOptions::new();
    options.write(true);
    if args.force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let mut file = options
        .open(out_path)
        .with_context(|| format!("create site profile: {}", out_path.display()))?;
    file.write_all(yaml.as_bytes())
        .with_context(|| format!("write site profile: {}", out_path.display()))?;
    file.flush()
        .with_context(|| format!("flush site profile: {}", out_path.display()))?;

    tracing::info!(out = %out_path.display(), "wrote default site profile");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_compiles() -> anyhow::Result<()> {
        let compiled = SiteProfile::default().compile()?;
        assert_eq!(compiled.list_fields.len(), 8);
        assert_eq!(compiled.detail_fields.len(), 10);
        assert_eq!(compiled.detail_url_field, "detail_url");
        Ok(())
    }

    #[test]
    fn list_url_fills_placeholders_and_encodes_filters() -> anyhow::Result<()> {
        let compiled = SiteProfile::default().compile()?;
        let url = compiled.page_url(3, "三体 小说", "sci-fi&more");
        assert_eq!(
            url,
            "https://findxsyu.libsp.cn/#/elecBook?keyword=%E4%B8%89%E4%BD%93+%E5%B0%8F%E8%AF%B4&category=sci-fi%26more&page=3"
        );
        Ok(())
    }

    #[test]
    fn compile_rejects_invalid_selector() {
        let mut profile = SiteProfile::default();
        profile.list_fields.push(FieldRule::text("broken", "div[["));

        let err = profile.compile().expect_err("invalid selector must fail");
        assert!(format!("{err:#}").contains("field broken"), "{err:#}");
    }

    #[test]
    fn compile_rejects_list_url_without_page_placeholder() {
        let profile = SiteProfile {
            list_url: "https://example.com/books".to_owned(),
            ..SiteProfile::default()
        };
        assert!(profile.compile().is_err());
    }

    #[test]
    fn compile_rejects_detail_link_field_missing_from_list() {
        let profile = SiteProfile {
            detail_url_field: "href".to_owned(),
            ..SiteProfile::default()
        };
        let err = profile.compile().expect_err("unknown link field must fail");
        assert!(format!("{err:#}").contains("\"href\""), "{err:#}");

        let list_only = SiteProfile {
            detail_url_field: "href".to_owned(),
            detail_fields: Vec::new(),
            ..SiteProfile::default()
        };
        assert!(list_only.compile().is_ok());
    }

    #[test]
    fn compile_rejects_duplicate_field_names() {
        let mut profile = SiteProfile::default();
        profile.detail_fields.push(FieldRule::text("pages", ".page-count"));

        let err = profile.compile().expect_err("duplicate name must fail");
        let message = format!("{err:#}");
        assert!(message.contains("detail_fields"), "{message}");
        assert!(message.contains("duplicate field name \"pages\""), "{message}");
    }

    #[test]
    fn yaml_profile_uses_defaults_for_optional_keys() -> anyhow::Result<()> {
        let yaml = r#"
list_url: "http://127.0.0.1/list?page={page}"
item_selector: "li.book"
list_fields:
  - name: title
    selector: h2
  - name: detail_url
    selector: a
    attr: href
    link: true
detail_fields: []
"#;
        let profile: SiteProfile = serde_yaml::from_str(yaml)?;
        assert_eq!(profile.ready_selector, "body");
        assert_eq!(profile.detail_url_field, "detail_url");
        assert!(profile.list_fields[1].link);
        assert_eq!(profile.list_fields[0].attr, None);
        profile.compile()?;
        Ok(())
    }

    #[test]
    fn default_profile_survives_yaml() -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(&SiteProfile::default())?;
        let back: SiteProfile = serde_yaml::from_str(&yaml)?;
        assert_eq!(back, SiteProfile::default());
        Ok(())
    }
}
