// Replay a recorded model response through the streaming schema extractor
use std::env;
use template_builder::{PartialSchema, SchemaStream};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let mut args = env::args().skip(1);
    let path = args
        .next()
        .ok_or("usage: replay_stream <response-file> [chunk-chars]")?;
    let chunk_chars: usize = match args.next() {
        Some(raw) => raw.parse()?,
        None => env::var("REPLAY_CHUNK_CHARS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8),
    };
    if chunk_chars == 0 {
        return Err("chunk-chars must be at least 1".into());
    }

    let text = std::fs::read_to_string(&path)?;
    let chars: Vec<char> = text.chars().collect();

    println!("\n=== Replaying {} ({} chars, {} per chunk) ===\n", path, chars.len(), chunk_chars);

    let mut stream = SchemaStream::new();
    let mut last = PartialSchema::default();
    let mut changes = 0;

    for (i, piece) in chars.chunks(chunk_chars).enumerate() {
        let chunk: String = piece.iter().collect();
        stream.push(&chunk);
        let snapshot = stream.snapshot();
        if *snapshot == last {
            continue;
        }
        changes += 1;
        println!("[chunk {:>5} | {:>7} bytes] {}", i + 1, stream.len(), summarize(snapshot));
        last = snapshot.clone();
    }

    println!("\n=== Final snapshot ({} changes) ===\n", changes);
    println!("{}", serde_json::to_string_pretty(stream.snapshot())?);

    Ok(())
}

fn summarize(schema: &PartialSchema) -> String {
    let objects: Vec<&str> = schema.objects.iter().map(|o| o.name.as_str()).collect();
    let current_fields: Vec<&str> = schema.current_fields.iter().map(|f| f.name.as_str()).collect();
    format!(
        "template={} category={} objects=[{}] current={} fields=[{}]",
        schema.template_name.as_deref().unwrap_or("-"),
        schema.category.as_deref().unwrap_or("-"),
        objects.join(", "),
        schema.current_object_name.as_deref().unwrap_or("-"),
        current_fields.join(", "),
    )
}
