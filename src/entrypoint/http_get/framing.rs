//! Envelope framing for the three response formats.
//!
//! | Format | Open | Item | Close |
//! |--------|------|------|-------|
//! | JSON | `{"items":[` | `{"id":…,"content":…}` comma separated | `]` `,"error":…` `,"pagination":{…}` `}` |
//! | XML | `<response><items>` | `<item>…</item>`, headers as `<header name=…>`, metadata as `<entry key=…>` | `</items>` `<error>…</error>` `<pagination>…</pagination>` `</response>` |
//! | Text | `items=` | `\nitem\nid=…\ncontent=…` | `\nerror…` `\npagination\nkey=value…` |

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::failure::ResponseMediaType;
use crate::message::Message;

/// Values of the pagination trailer; absent fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pagination {
    pub cursor: Option<String>,
    pub next_cursor: Option<String>,
    pub limit: Option<String>,
}

impl Pagination {
    fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("cursor", self.cursor.as_deref()),
            ("nextCursor", self.next_cursor.as_deref()),
            ("limit", self.limit.as_deref()),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Framer {
    media_type: ResponseMediaType,
    headers_in_payload: bool,
    metadata_in_payload: bool,
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

fn cdata(raw: &str) -> String {
    format!("<![CDATA[{}]]>", raw.replace("]]>", "]]]]><![CDATA[>"))
}

impl Framer {
    #[must_use]
    pub fn new(media_type: ResponseMediaType, headers_in_payload: bool, metadata_in_payload: bool) -> Self {
        Self {
            media_type,
            headers_in_payload,
            metadata_in_payload,
        }
    }

    #[must_use]
    pub fn open(&self) -> Bytes {
        Bytes::from_static(match self.media_type {
            ResponseMediaType::Json => "{\"items\":[",
            ResponseMediaType::Xml => "<response><items>",
            ResponseMediaType::Text => "items=",
        }
        .as_bytes())
    }

    /// One item; `first` decides the JSON separator.
    #[must_use]
    pub fn item(&self, message: &Message, first: bool) -> Bytes {
        match self.media_type {
            ResponseMediaType::Json => {
                let mut out = if first { String::new() } else { ",".to_string() };
                out.push_str(&self.json_object(message).to_string());
                Bytes::from(out)
            }
            ResponseMediaType::Xml => Bytes::from(self.xml_element(message, "item")),
            ResponseMediaType::Text => Bytes::from(self.text_block(message, "item")),
        }
    }

    /// Close the item list.
    #[must_use]
    pub fn close_items(&self) -> Bytes {
        Bytes::from_static(match self.media_type {
            ResponseMediaType::Json => "]",
            ResponseMediaType::Xml => "</items>",
            ResponseMediaType::Text => "",
        }
        .as_bytes())
    }

    #[must_use]
    pub fn error(&self, message: &Message) -> Bytes {
        match self.media_type {
            ResponseMediaType::Json => {
                Bytes::from(format!(",\"error\":{}", self.json_object(message)))
            }
            ResponseMediaType::Xml => Bytes::from(self.xml_element(message, "error")),
            ResponseMediaType::Text => Bytes::from(self.text_block(message, "error")),
        }
    }

    /// Pagination trailer followed by the closing delimiter.
    #[must_use]
    pub fn close(&self, pagination: &Pagination) -> Bytes {
        match self.media_type {
            ResponseMediaType::Json => {
                let fields: Map<String, Value> = pagination
                    .fields()
                    .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                    .collect();
                Bytes::from(format!(",\"pagination\":{}}}", Value::Object(fields)))
            }
            ResponseMediaType::Xml => {
                let mut out = String::new();
                let mut fields = pagination.fields().peekable();
                if fields.peek().is_none() {
                    out.push_str("<pagination/>");
                } else {
                    out.push_str("<pagination>");
                    for (k, v) in fields {
                        out.push_str(&format!("<{k}>{}</{k}>", escape_xml(v)));
                    }
                    out.push_str("</pagination>");
                }
                out.push_str("</response>");
                Bytes::from(out)
            }
            ResponseMediaType::Text => {
                let mut out = String::from("\npagination");
                for (k, v) in pagination.fields() {
                    out.push_str(&format!("\n{k}={v}"));
                }
                Bytes::from(out)
            }
        }
    }

    fn json_object(&self, message: &Message) -> Value {
        let mut object = Map::new();
        object.insert("id".into(), Value::String(message.id().to_string()));
        object.insert("content".into(), Value::String(message.content_str().into_owned()));
        if self.headers_in_payload {
            object.insert(
                "headers".into(),
                serde_json::to_value(message.headers()).unwrap_or(Value::Null),
            );
        }
        if self.metadata_in_payload {
            object.insert(
                "metadata".into(),
                Value::Object(message.metadata().clone().into_iter().collect()),
            );
        }
        Value::Object(object)
    }

    fn xml_element(&self, message: &Message, tag: &str) -> String {
        let mut out = format!("<{tag}><id>{}</id><content>{}</content>", escape_xml(message.id()), cdata(&message.content_str()));
        if self.headers_in_payload {
            out.push_str("<headers>");
            for (name, values) in message.headers().grouped() {
                out.push_str(&format!(
                    "<header name=\"{}\">{}</header>",
                    escape_xml(name),
                    escape_xml(&values.join(","))
                ));
            }
            out.push_str("</headers>");
        }
        if self.metadata_in_payload {
            out.push_str("<metadata>");
            for (key, value) in message.metadata() {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out.push_str(&format!(
                    "<entry key=\"{}\">{}</entry>",
                    escape_xml(key),
                    escape_xml(&text)
                ));
            }
            out.push_str("</metadata>");
        }
        out.push_str(&format!("</{tag}>"));
        out
    }

    fn text_block(&self, message: &Message, kind: &str) -> String {
        let mut out = format!("\n{kind}\nid={}\ncontent={}", message.id(), message.content_str());
        if self.headers_in_payload {
            let headers = serde_json::to_string(message.headers()).unwrap_or_default();
            out.push_str(&format!("\nheaders={headers}"));
        }
        if self.metadata_in_payload {
            let metadata = serde_json::to_string(message.metadata()).unwrap_or_default();
            out.push_str(&format!("\nmetadata={metadata}"));
        }
        out
    }
}
