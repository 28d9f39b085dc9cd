use serde_json::{json, Value};

use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });
            if let (Some(target), Some(Value::Object(extra))) = (response.as_object_mut(), data) {
                target.extend(extra);
            }
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output a list of names in the appropriate format
pub fn output_list(output_format: &OutputFormat, name: &str, items: &[String]) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = serde_json::Map::new();
            response.insert(name.to_string(), json!(items));
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            if items.is_empty() {
                println!("No {}", name);
            }
            for item in items {
                println!("{}", item);
            }
        }
    }
    Ok(())
}
