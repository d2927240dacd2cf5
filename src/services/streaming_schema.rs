// src/services/streaming_schema.rs
//! Progressive extraction of a template schema from a JSON document that is
//! still being streamed by the model.
//!
//! The buffer is almost always invalid JSON (cut off mid-token), so the
//! extractor mixes key regexes with a brace-depth scan that skips string
//! contents. Only `{...}` blocks whose braces balanced are handed to
//! `serde_json`; everything else degrades to regex-recovered names.

use crate::models::template::{ParsedField, ParsedObject, PartialSchema};
use regex::Regex;
use serde_json::{Map, Value};
use std::ops::Range;

/// Buffers with fewer characters than this are returned as an empty schema.
pub const MIN_BUFFER_CHARS: usize = 10;

lazy_static::lazy_static! {
    static ref TEMPLATE_NAME_RE: Regex = string_pair_regex("template_name");
    static ref CATEGORY_RE: Regex = string_pair_regex("category");
    static ref NAME_RE: Regex = string_pair_regex("name");
    static ref FIELD_NAME_RE: Regex = string_pair_regex("field_name");
    static ref TYPE_RE: Regex = string_pair_regex("type");
    static ref OBJECTS_KEY_RE: Regex = Regex::new(r#""objects"\s*:\s*\["#).unwrap();
    static ref FIELDS_KEY_RE: Regex = Regex::new(r#""fields"\s*:\s*\["#).unwrap();
}

/// `"<key>": "<value>"` where the value is a complete JSON string.
fn string_pair_regex(key: &str) -> Regex {
    Regex::new(&format!(r#""{}"\s*:\s*"((?:[^"\\]|\\.)*)""#, regex::escape(key))).unwrap()
}

/// Builds the best-effort schema snapshot for `buffer`.
///
/// Never fails: sub-blocks that do not parse are dropped or reduced to the
/// name a regex can still find in them.
pub fn parse_streaming_schema(buffer: &str) -> PartialSchema {
    let mut schema = PartialSchema::default();

    if buffer.chars().nth(MIN_BUFFER_CHARS - 1).is_none() {
        return schema;
    }

    schema.template_name = capture_string(&TEMPLATE_NAME_RE, buffer);
    schema.category = capture_string(&CATEGORY_RE, buffer);

    let Some(objects_key) = OBJECTS_KEY_RE.find(buffer) else {
        return schema;
    };

    let scan = scan_array(buffer, objects_key.end());
    schema.objects = scan
        .closed
        .iter()
        .filter_map(|range| parse_object(&buffer[range.clone()]))
        .collect();

    if let Some(start) = scan.open_start {
        let (name, fields) = parse_in_progress(&buffer[start..]);
        schema.current_object_name = name;
        schema.current_fields = fields;
    }

    if !scan.closed.is_empty() && scan.closed.len() != schema.objects.len() {
        tracing::trace!(
            closed = scan.closed.len(),
            accepted = schema.objects.len(),
            "dropped closed object blocks without name/fields"
        );
    }

    schema
}

/// Members found while scanning the body of a JSON array.
#[derive(Debug, Default)]
struct ArrayScan {
    /// Byte ranges of top-level `{...}` members whose braces balanced.
    closed: Vec<Range<usize>>,
    /// Start of the member that was still open when the text ran out.
    open_start: Option<usize>,
    /// Offset just past the `]` that closed the array.
    end: Option<usize>,
}

/// Scans from `from` (just after a `[`) until the matching `]` or end of text.
///
/// Brace characters inside strings are ignored, and a `]` seen at depth 0 ends
/// the array so that sibling keys further on are never read as members.
fn scan_array(text: &str, from: usize) -> ArrayScan {
    let bytes = text.as_bytes();
    let mut scan = ArrayScan::default();
    let mut depth = 0usize;
    let mut start = None;
    let mut i = from;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        scan.closed.push(s..i + 1);
                    }
                }
            }
            b']' if depth == 0 => {
                scan.end = Some(i + 1);
                return scan;
            }
            _ => {}
        }
        i += 1;
    }

    if depth > 0 {
        scan.open_start = start;
    }
    scan
}

/// Offset just past the string opened at `open`, or the end of input if the
/// string is unterminated.
fn skip_string(bytes: &[u8], open: usize) -> usize {
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn parse_object(text: &str) -> Option<ParsedObject> {
    let value: Value = serde_json::from_str(text).ok()?;
    let object = value.as_object()?;
    let name = object.get("name")?.as_str().filter(|n| !n.is_empty())?;
    let fields = object.get("fields")?.as_array()?;

    Some(ParsedObject {
        name: name.to_string(),
        icon: string_prop(object, "icon"),
        description: string_prop(object, "description"),
        fields: fields.iter().filter_map(field_from_value).collect(),
        sample_data: object
            .get("sample_data")
            .and_then(Value::as_array)
            .map(|rows| rows.iter().filter_map(|row| row.as_object().cloned()).collect()),
    })
}

fn field_from_value(value: &Value) -> Option<ParsedField> {
    let field = value.as_object()?;
    let name = string_prop(field, "name").or_else(|| string_prop(field, "field_name"))?;
    Some(ParsedField::new(name, string_prop(field, "type")))
}

fn string_prop(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Recovers the name and fields of the object the stream is currently writing.
/// `tail` starts at that object's opening brace and runs to the end of the buffer.
fn parse_in_progress(tail: &str) -> (Option<String>, Vec<ParsedField>) {
    let name = capture_string(&NAME_RE, &own_keys_text(tail));

    let Some(fields_key) = FIELDS_KEY_RE.find(tail) else {
        return (name, Vec::new());
    };

    let scan = scan_array(tail, fields_key.end());
    let mut fields: Vec<ParsedField> = scan
        .closed
        .iter()
        .filter_map(|range| parse_field(&tail[range.clone()]))
        .collect();

    if let Some(start) = scan.open_start {
        fields.extend(partial_field(&tail[start..]));
    }

    (name, fields)
}

/// Text of the block opened at `block[0]` with the contents of every nested
/// `{...}` and `[...]` removed, so key regexes only see the block's own keys.
fn own_keys_text(block: &str) -> String {
    let bytes = block.as_bytes();
    let mut out = String::with_capacity(block.len());
    let mut depth = 0usize;
    let mut kept_from = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'{' | b'[' => {
                depth += 1;
                if depth == 2 {
                    out.push_str(&block[kept_from..=i]);
                }
            }
            b'}' | b']' => {
                if depth == 2 {
                    kept_from = i;
                }
                depth = depth.saturating_sub(1);
            }
            _ => {}
        }
        i += 1;
    }

    if depth <= 1 {
        out.push_str(&block[kept_from..]);
    }
    out
}

fn parse_field(text: &str) -> Option<ParsedField> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => field_from_value(&value),
        Err(_) => partial_field(text),
    }
}

/// Regex fallback for a field block that is not valid JSON. Yields nothing
/// until the field's name value has its closing quote.
fn partial_field(text: &str) -> Option<ParsedField> {
    let own = own_keys_text(text);
    let name = capture_string(&NAME_RE, &own).or_else(|| capture_string(&FIELD_NAME_RE, &own))?;
    Some(ParsedField::new(name, capture_string(&TYPE_RE, &own)))
}

fn capture_string(re: &Regex, text: &str) -> Option<String> {
    let raw = re.captures(text)?.get(1)?.as_str();
    Some(decode_json_string(raw))
}

/// Undoes JSON escapes in a captured string body, keeping the raw text when it
/// is not a valid JSON string.
fn decode_json_string(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_string();
    }
    serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_else(|_| raw.to_string())
}

/// Owns the text of one generation cycle and the snapshot derived from it.
#[derive(Debug, Clone, Default)]
pub struct SchemaStream {
    buffer: String,
    snapshot: PartialSchema,
}

impl SchemaStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and re-derives the snapshot from the whole buffer.
    pub fn push(&mut self, chunk: &str) -> &PartialSchema {
        if !chunk.is_empty() {
            self.buffer.push_str(chunk);
            self.snapshot = parse_streaming_schema(&self.buffer);
        }
        &self.snapshot
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.snapshot = PartialSchema::default();
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn snapshot(&self) -> &PartialSchema {
        &self.snapshot
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_DOCUMENT: &str = r#"{
  "template_name": "Bakery CRM",
  "category": "Retail",
  "objects": [
    {
      "name": "Customer",
      "icon": "user",
      "description": "People who buy {cakes} and [bread]; say \"hi\"",
      "fields": [
        {"name": "Email", "type": "email"},
        {"field_name": "Phone", "type": "phone"}
      ],
      "sample_data": [{"Email": "ana@example.com", "Phone": "555-0100"}]
    },
    {
      "name": "Broken",
      "description": "no fields key here"
    },
    {
      "name": "Order",
      "icon": "cart",
      "fields": [
        {"name": "Total", "type": "currency"},
        {"name": "Status", "type": "select", "options": [{"name": "Paid"}]}
      ]
    }
  ],
  "relations": [
    {"name": "customer_orders", "fields": [{"name": "Ghost"}], "from": "Customer", "to": "Order"}
  ],
  "sample_data": {"Order": [{"Total": 12}]}
}"#;

    fn char_prefixes(text: &str) -> impl Iterator<Item = &str> {
        text.char_indices()
            .map(move |(i, _)| &text[..i])
            .chain(std::iter::once(text))
    }

    #[test]
    fn test_short_buffer_is_empty() {
        assert!(parse_streaming_schema("").is_empty());
        assert!(parse_streaming_schema("{\"a\":[{}]").is_empty());
        assert_eq!(parse_streaming_schema("{\"objec"), PartialSchema::default());
    }

    #[test]
    fn test_template_name_and_category_without_objects() {
        let schema = parse_streaming_schema(r#"{"template_name": "CRM", "category": "Sales", "obj"#);
        assert_eq!(schema.template_name.as_deref(), Some("CRM"));
        assert_eq!(schema.category.as_deref(), Some("Sales"));
        assert!(schema.objects.is_empty());
        assert!(schema.current_object_name.is_none());
        assert!(schema.current_fields.is_empty());
    }

    #[test]
    fn test_objects_key_without_bracket_yet() {
        let schema = parse_streaming_schema(r#"{"template_name": "CRM", "objects": "#);
        assert_eq!(schema.template_name.as_deref(), Some("CRM"));
        assert!(schema.objects.is_empty());
        assert!(schema.current_object_name.is_none());
    }

    #[test]
    fn test_escaped_template_name_is_decoded() {
        let schema = parse_streaming_schema(r#"{"template_name": "Joe's \"Best\" CRM", "objects": ["#);
        assert_eq!(schema.template_name.as_deref(), Some("Joe's \"Best\" CRM"));
    }

    #[test]
    fn test_full_document_matches_json_objects() {
        let schema = parse_streaming_schema(FULL_DOCUMENT);

        let expected: Vec<String> = serde_json::from_str::<Value>(FULL_DOCUMENT).unwrap()["objects"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|o| o.get("name").is_some() && o.get("fields").is_some())
            .map(|o| o["name"].as_str().unwrap().to_string())
            .collect();
        let names: Vec<String> = schema.objects.iter().map(|o| o.name.clone()).collect();
        assert_eq!(names, expected);
        assert_eq!(names, vec!["Customer", "Order"]);

        let customer = &schema.objects[0];
        assert_eq!(customer.icon.as_deref(), Some("user"));
        assert_eq!(
            customer.description.as_deref(),
            Some("People who buy {cakes} and [bread]; say \"hi\"")
        );
        assert_eq!(
            customer.fields,
            vec![
                ParsedField::new("Email", Some("email".to_string())),
                ParsedField::new("Phone", Some("phone".to_string())),
            ]
        );
        let rows = customer.sample_data.as_ref().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Email"], "ana@example.com");

        assert_eq!(schema.objects[1].fields.len(), 2);
        assert!(schema.current_object_name.is_none());
        assert!(schema.current_fields.is_empty());
    }

    #[test]
    fn test_objects_only_grow_as_buffer_grows() {
        let mut previous = PartialSchema::default();
        for prefix in char_prefixes(FULL_DOCUMENT) {
            let schema = parse_streaming_schema(prefix);
            assert!(
                schema.objects.starts_with(&previous.objects),
                "objects regressed at prefix of length {}",
                prefix.len()
            );
            previous = schema;
        }
        assert_eq!(previous.objects.len(), 2);
    }

    #[test]
    fn test_chunked_stream_matches_whole_parse() {
        for chunk_size in [1, 3, 7, 64] {
            let mut stream = SchemaStream::new();
            let chars: Vec<char> = FULL_DOCUMENT.chars().collect();
            for piece in chars.chunks(chunk_size) {
                let chunk: String = piece.iter().collect();
                stream.push(&chunk);
            }
            assert_eq!(stream.buffer(), FULL_DOCUMENT);
            assert_eq!(stream.snapshot(), &parse_streaming_schema(FULL_DOCUMENT));
        }
    }

    #[test]
    fn test_braces_inside_description_do_not_confuse_depth() {
        let buffer = r#"{"objects": [{"name": "Note", "description": "}}]] {[ \"quoted}\" \\", "fields": [{"name": "Body"}]}, {"name": "Tag"#;
        let schema = parse_streaming_schema(buffer);

        assert_eq!(schema.objects.len(), 1);
        assert_eq!(schema.objects[0].name, "Note");
        assert_eq!(schema.objects[0].fields, vec![ParsedField::new("Body", None)]);
        assert_eq!(schema.current_object_name, None);
    }

    #[test]
    fn test_relations_never_leak_into_objects() {
        let closed = r#"{"objects": [{"name": "A", "fields": []}], "relations": [{"name": "B", "fields": [{"name": "x"}]}]}"#;
        let schema = parse_streaming_schema(closed);
        assert_eq!(schema.objects.len(), 1);
        assert_eq!(schema.objects[0].name, "A");

        let truncated = r#"{"objects": [{"name": "A", "fields": []}], "relations": [{"name": "B", "fields": [{"name": "x"#;
        let schema = parse_streaming_schema(truncated);
        assert_eq!(schema.objects.len(), 1);
        assert!(schema.current_object_name.is_none());
        assert!(schema.current_fields.is_empty());

        for prefix in char_prefixes(FULL_DOCUMENT) {
            let schema = parse_streaming_schema(prefix);
            assert!(schema.objects.iter().all(|o| o.name != "customer_orders"));
            assert!(schema.current_fields.iter().all(|f| f.name != "Ghost"));
        }
    }

    #[test]
    fn test_never_panics_on_garbage() {
        let deep = format!(r#"{{"objects": [{}"#, "{[\"\\".repeat(200));
        let inputs = vec![
            String::new(),
            "\"\"\"\"\"\"\"\"\"\"\"".to_string(),
            "}}}}]]]]{{{{[[[[".to_string(),
            r#"{"objects": [{"name": "A\"#.to_string(),
            r#"{"objects": [{"name": "A", "fields": [{"name": "\u00"#.to_string(),
            r#"{"template_name": "bad \q escape", "objects": [}"#.to_string(),
            "{\"objects\": [{\"name\": \"Café ☕\", \"fields\": [{\"name\": \"Größe".to_string(),
            deep,
        ];
        for input in &inputs {
            for prefix in char_prefixes(input) {
                let _ = parse_streaming_schema(prefix);
            }
        }

        let nested = format!(r#"{{"objects": [{}"#, "{".repeat(50_000));
        let schema = parse_streaming_schema(&nested);
        assert!(schema.objects.is_empty());

        let schema = parse_streaming_schema(r#"{"template_name": "bad \q escape", "objects": []}"#);
        assert_eq!(schema.template_name.as_deref(), Some(r"bad \q escape"));
    }

    #[test]
    fn test_in_progress_field_after_name_pair() {
        let buffer = r#"{"objects": [{"name": "Contact", "fields": [{"name": "Phone", "type": "phone"}, {"name": "Email""#;
        let schema = parse_streaming_schema(buffer);

        assert!(schema.objects.is_empty());
        assert_eq!(schema.current_object_name.as_deref(), Some("Contact"));
        assert_eq!(
            schema.current_fields,
            vec![
                ParsedField::new("Phone", Some("phone".to_string())),
                ParsedField::new("Email", None),
            ]
        );
    }

    #[test]
    fn test_in_progress_object_without_fields_key() {
        let schema = parse_streaming_schema(r#"{"objects": [{"name": "Invoice", "icon": "fi"#);
        assert_eq!(schema.current_object_name.as_deref(), Some("Invoice"));
        assert!(schema.current_fields.is_empty());
    }

    #[test]
    fn test_object_name_written_after_fields() {
        let buffer = r#"{"objects": [{"fields": [{"name": "Street"}], "name": "Address", "icon": "m"#;
        let schema = parse_streaming_schema(buffer);
        assert_eq!(schema.current_object_name.as_deref(), Some("Address"));
        assert_eq!(schema.current_fields, vec![ParsedField::new("Street", None)]);

        let open = r#"{"objects": [{"fields": [{"name": "Street"}, {"name": "City"#;
        let schema = parse_streaming_schema(open);
        assert_eq!(schema.current_object_name, None);
        assert_eq!(schema.current_fields, vec![ParsedField::new("Street", None)]);
    }

    #[test]
    fn test_partial_field_with_nested_options_keeps_field_name() {
        let buffer = r#"{"objects": [{"name": "Deal", "fields": [{"name": "Stage", "type": "select", "options": [{"name": "Won"#;
        let schema = parse_streaming_schema(buffer);
        assert_eq!(
            schema.current_fields,
            vec![ParsedField::new("Stage", Some("select".to_string()))]
        );
    }

    #[test]
    fn test_option_names_are_not_taken_as_field_name() {
        let buffer = r#"{"objects": [{"name": "Deal", "fields": [{"type": "select", "options": [{"name": "Won"}], "na"#;
        let schema = parse_streaming_schema(buffer);
        assert_eq!(schema.current_object_name.as_deref(), Some("Deal"));
        assert!(schema.current_fields.is_empty());

        let named = format!("{}{}", buffer, r#"me": "Stage""#);
        let schema = parse_streaming_schema(&named);
        assert_eq!(
            schema.current_fields,
            vec![ParsedField::new("Stage", Some("select".to_string()))]
        );
    }

    #[test]
    fn test_sample_rows_are_not_taken_as_object_name() {
        let buffer = r#"{"objects": [{"fields": [{"name": "Age"}], "sample_data": [{"name": "Bob"}], "na"#;
        let schema = parse_streaming_schema(buffer);
        assert_eq!(schema.current_object_name, None);
        assert_eq!(schema.current_fields, vec![ParsedField::new("Age", None)]);

        let named = format!("{}{}", buffer, r#"me": "Person", "ic"#);
        let schema = parse_streaming_schema(&named);
        assert_eq!(schema.current_object_name.as_deref(), Some("Person"));
    }

    #[test]
    fn test_object_with_empty_name_is_dropped() {
        let buffer = r#"{"objects": [{"name": "", "fields": []}, {"name": "Lead", "fields": []}]}"#;
        let schema = parse_streaming_schema(buffer);
        let names: Vec<&str> = schema.objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["Lead"]);
    }

    #[test]
    fn test_end_to_end_crm_buffer() {
        let buffer = r#"{"template_name":"CRM","category":"Sales","objects":[{"name":"Client","fields":[{"name":"Email","type":"text"}]},{"name":"Deal","fields":[{"name":"Amo"#;
        let schema = parse_streaming_schema(buffer);

        assert_eq!(schema.template_name.as_deref(), Some("CRM"));
        assert_eq!(schema.category.as_deref(), Some("Sales"));
        assert_eq!(
            schema.objects,
            vec![ParsedObject {
                name: "Client".to_string(),
                icon: None,
                description: None,
                fields: vec![ParsedField::new("Email", Some("text".to_string()))],
                sample_data: None,
            }]
        );
        assert_eq!(schema.current_object_name.as_deref(), Some("Deal"));
        // The value "Amo is unterminated, so the field is not reported yet.
        assert!(schema.current_fields.is_empty());

        let completed = format!("{}{}", buffer, r#"unt""#);
        let schema = parse_streaming_schema(&completed);
        assert_eq!(schema.current_fields, vec![ParsedField::new("Amount", None)]);
    }

    #[test]
    fn test_stream_reset_clears_snapshot() {
        let mut stream = SchemaStream::new();
        stream.push(r#"{"template_name": "CRM", "objects": ["#);
        assert_eq!(stream.snapshot().template_name.as_deref(), Some("CRM"));
        assert!(!stream.is_empty());

        stream.reset();
        assert!(stream.is_empty());
        assert_eq!(stream.len(), 0);
        assert!(stream.snapshot().is_empty());
    }
}
