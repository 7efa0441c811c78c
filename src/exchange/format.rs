// 导入导出的 JSON 结构与格式识别
//
// 识别按顺序尝试：包装格式 -> 扁平数组 -> 通用字典，第一个匹配的胜出

use crate::error::ImportError;
use crate::models::{
    default_scholar_name, NotificationSettings, ScholarRecord, SettingsUpdate, UpdateInterval,
};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 导出格式版本
pub const EXPORT_VERSION: &str = "1.1";

/// 导出的形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportShape {
    /// 扁平数组，每个元素是一条读数
    #[default]
    FlatArray,
    /// `{scholars, citationHistory, exportDate, version, settings}`
    Wrapped,
}

/// 可移植的一条读数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEntry {
    pub scholar_id: String,
    pub scholar_name: String,
    /// ISO-8601
    pub timestamp: String,
    pub citation_count: i64,
}

impl ExportEntry {
    pub fn new(scholar_id: &str, scholar_name: &str, timestamp: DateTime<Utc>, citation_count: i64) -> Self {
        Self {
            scholar_id: scholar_id.to_string(),
            scholar_name: scholar_name.to_string(),
            timestamp: format_timestamp(timestamp),
            citation_count,
        }
    }
}

/// 随包装格式导出的设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedSettings {
    pub update_interval: UpdateInterval,
    pub notification: NotificationSettings,
}

/// 包装格式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedExport {
    pub scholars: Vec<ScholarRecord>,
    pub citation_history: Vec<ExportEntry>,
    pub export_date: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<ExportedSettings>,
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 解析 ISO-8601 时间；不带时区的按 UTC 处理
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// 导入时解析出的一条读数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub scholar_id: String,
    pub scholar_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub citation_count: i64,
}

/// 识别出的导入负载
#[derive(Debug, Clone)]
pub enum ImportPayload {
    Wrapped {
        scholars: Vec<Value>,
        history: Vec<Value>,
        settings: Option<Value>,
    },
    FlatArray(Vec<Value>),
    GenericDict {
        scholars: Vec<Value>,
        history: Vec<Value>,
        settings: Option<Value>,
    },
}

/// 拆开后的负载：学者记录、读数、内嵌设置
pub struct PayloadParts {
    pub scholars: Vec<Value>,
    pub history: Vec<Value>,
    pub settings: Option<Value>,
}

impl ImportPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            ImportPayload::Wrapped { .. } => "wrapped",
            ImportPayload::FlatArray(_) => "flatArray",
            ImportPayload::GenericDict { .. } => "genericDict",
        }
    }

    pub fn into_parts(self) -> PayloadParts {
        match self {
            ImportPayload::Wrapped {
                scholars,
                history,
                settings,
            }
            | ImportPayload::GenericDict {
                scholars,
                history,
                settings,
            } => PayloadParts {
                scholars,
                history,
                settings,
            },
            ImportPayload::FlatArray(history) => PayloadParts {
                scholars: Vec::new(),
                history,
                settings: None,
            },
        }
    }
}

type PayloadParser = fn(&Value) -> Option<ImportPayload>;

const PARSERS: [PayloadParser; 3] = [parse_wrapped, parse_flat_array, parse_generic_dict];

/// 识别导入负载的形状
pub fn detect_payload(bytes: &[u8]) -> Result<ImportPayload, ImportError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| ImportError::InvalidJson(e.to_string()))?;

    PARSERS
        .iter()
        .find_map(|parse| parse(&value))
        .ok_or(ImportError::UnrecognizedFormat)
}

fn array_field(object: &Map<String, Value>, key: &str) -> Option<Vec<Value>> {
    object.get(key).and_then(Value::as_array).cloned()
}

fn parse_wrapped(value: &Value) -> Option<ImportPayload> {
    let object = value.as_object()?;
    object.get("version")?.as_str()?;
    object.get("exportDate")?.as_str()?;
    let history = array_field(object, "citationHistory")?;

    Some(ImportPayload::Wrapped {
        scholars: array_field(object, "scholars").unwrap_or_default(),
        history,
        settings: object.get("settings").filter(|s| s.is_object()).cloned(),
    })
}

fn parse_flat_array(value: &Value) -> Option<ImportPayload> {
    let items = value.as_array()?;
    if !items.iter().all(Value::is_object) {
        return None;
    }
    Some(ImportPayload::FlatArray(items.clone()))
}

fn parse_generic_dict(value: &Value) -> Option<ImportPayload> {
    let object = value.as_object()?;
    let scholars = array_field(object, "scholars");
    let history = array_field(object, "citationHistory");
    let data = array_field(object, "data");
    if scholars.is_none() && history.is_none() && data.is_none() {
        return None;
    }

    let mut entries = history.unwrap_or_default();
    entries.extend(data.unwrap_or_default());

    Some(ImportPayload::GenericDict {
        scholars: scholars.unwrap_or_default(),
        history: entries,
        settings: object.get("settings").filter(|s| s.is_object()).cloned(),
    })
}

fn str_field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| object.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn int_field(object: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| object.get(*k).and_then(Value::as_i64))
}

/// 解析一条读数，缺字段、时间戳无法解析或引用数为负时返回 None
pub fn parse_entry(value: &Value) -> Option<ParsedEntry> {
    let object = value.as_object()?;
    let scholar_id = str_field(object, &["scholarId", "scholar_id"])?;
    let citation_count = int_field(object, &["citationCount", "citations"]).filter(|c| *c >= 0)?;
    let timestamp = str_field(object, &["timestamp", "date"]).and_then(parse_timestamp)?;

    Some(ParsedEntry {
        scholar_id: scholar_id.to_string(),
        scholar_name: str_field(object, &["scholarName", "name"]).map(str::to_string),
        timestamp,
        citation_count,
    })
}

/// 解析一条学者记录，缺少ID时返回 None
pub fn parse_scholar(value: &Value) -> Option<ScholarRecord> {
    let object = value.as_object()?;
    let id = str_field(object, &["id", "scholarId"])?;
    let name = str_field(object, &["name", "scholarName", "displayName"])
        .map(str::to_string)
        .unwrap_or_else(|| default_scholar_name(id));

    Some(
        ScholarRecord::new(id, name).with_snapshot(
            int_field(object, &["citations", "citationCount"]).filter(|c| *c >= 0),
            str_field(object, &["lastUpdated"]).and_then(parse_timestamp),
        ),
    )
}

/// 从内嵌的 settings 对象中提取可应用的设置，未知键忽略
pub fn parse_settings(value: &Value) -> Option<SettingsUpdate> {
    let object = value.as_object()?;

    // 更新间隔既可能是枚举名，也可能是秒数
    let update_interval = object.get("updateInterval").and_then(|v| match v {
        Value::String(_) => serde_json::from_value::<UpdateInterval>(v.clone()).ok(),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f as u64))
            .and_then(UpdateInterval::from_secs),
        _ => None,
    });
    let notification = object
        .get("notification")
        .and_then(|v| serde_json::from_value::<NotificationSettings>(v.clone()).ok());

    if update_interval.is_none() && notification.is_none() {
        return None;
    }

    Some(SettingsUpdate {
        update_interval,
        notification,
        ..Default::default()
    })
}
