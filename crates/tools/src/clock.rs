//! Current time tool

use async_trait::async_trait;
use serde_json::json;

use crate::registry::Tool;
use crate::ToolError;

pub struct ClockTool;

impl ClockTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClockTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "time"
    }

    fn description(&self) -> &str {
        "Get the current date and time. Optionally pass a UTC offset in hours."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "utc_offset_hours": {
                    "type": "number",
                    "description": "UTC offset of the desired timezone, e.g. 8 for Beijing"
                }
            },
            "required": []
        })
    }

    async fn invoke(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let now = match args["utc_offset_hours"].as_f64() {
            Some(offset) => {
                let seconds = (offset * 3600.0) as i32;
                let tz = chrono::FixedOffset::east_opt(seconds).ok_or_else(|| {
                    ToolError::InvalidArguments(format!("offset {offset} out of range"))
                })?;
                chrono::Utc::now().with_timezone(&tz).naive_local()
            }
            None => chrono::Local::now().naive_local(),
        };

        Ok(now.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}
