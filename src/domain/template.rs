//! 参数模板解析
//!
//! 将 `${path.expression}` 占位符替换为上下文中的值。路径支持字段访问和
//! 数组下标，例如 `${seriesDirList[0]}`、`${params.model.name}`。
//!
//! 输出路径模板解析后如包含 `*`，会按通配符在文件系统上展开。

use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Invalid wildcard pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },
}

const OPEN: &str = "${";
const CLOSE: char = '}';
const WILDCARD: char = '*';

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Field(&'a str),
    Index(usize),
}

/// 解析路径表达式，格式错误时返回 None
fn parse_path(expr: &str) -> Option<Vec<Segment<'_>>> {
    let expr = expr.trim();
    let expr = expr.strip_prefix("$.").unwrap_or(expr);
    let mut segments = Vec::new();

    for part in expr.split('.') {
        let (field, mut rest) = match part.find('[') {
            Some(i) => (&part[..i], &part[i..]),
            None => (part, ""),
        };
        if !field.is_empty() {
            segments.push(Segment::Field(field));
        }
        while !rest.is_empty() {
            let close = rest.find(']')?;
            let index = rest.get(1..close)?.trim().parse().ok()?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return None;
            }
        }
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}

/// 在上下文中查找路径
pub fn lookup<'a>(context: &'a Value, expr: &str) -> Option<&'a Value> {
    let segments = parse_path(expr)?;
    let mut current = context;
    for segment in segments {
        current = match segment {
            Segment::Field(name) => current.get(name)?,
            Segment::Index(i) => current.get(i)?,
        };
    }
    Some(current)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// 替换模板字符串中的全部占位符
///
/// 无法解析的路径替换为空字符串；缺少右括号时其余部分按原样保留
pub fn resolve(template: &str, context: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            out.push_str(&rest[start..]);
            return out;
        };

        let expr = &after_open[..end];
        match lookup(context, expr) {
            Some(value) => out.push_str(&stringify(value)),
            None => tracing::debug!(expression = %expr, "Template variable not found"),
        }
        rest = &after_open[end + 1..];
    }

    out.push_str(rest);
    out
}

/// 解析命令行参数
///
/// 参数先以空格拼接，整体替换后再按空格拆分。
/// 替换值中的空格会改变参数边界，这是已知的限制。
pub fn resolve_args(args: &[String], context: &Value) -> Vec<String> {
    if args.is_empty() {
        return Vec::new();
    }
    resolve(&args.join(" "), context)
        .split(' ')
        .map(str::to_string)
        .collect()
}

/// 解析输出路径模板并展开通配符
///
/// 结果 = 不含通配符的路径 ++ 所有通配符展开结果，保持配置顺序
pub fn resolve_output_paths(
    patterns: &[String],
    context: &Value,
) -> Result<Vec<PathBuf>, TemplateError> {
    let mut literals = Vec::new();
    let mut expanded = Vec::new();

    for pattern in patterns {
        let resolved = resolve(pattern, context);
        if resolved.contains(WILDCARD) {
            expanded.extend(expand_wildcard(&resolved)?);
        } else {
            literals.push(PathBuf::from(resolved));
        }
    }

    literals.extend(expanded);
    Ok(literals)
}

/// 拆分为工作目录前缀和通配符后缀
///
/// 以第一个 `*` 之前最后一个路径分隔符为界
fn split_wildcard(resolved: &str) -> (&str, &str) {
    let wildcard_index = resolved.find(WILDCARD).unwrap_or(resolved.len());
    match resolved[..wildcard_index].rfind(['/', '\\']) {
        Some(sep) => (&resolved[..=sep], &resolved[sep + 1..]),
        None => ("", resolved),
    }
}

/// 展开通配符，仅返回文件，按路径排序
pub fn expand_wildcard(resolved: &str) -> Result<Vec<PathBuf>, TemplateError> {
    let (working_dir, suffix) = split_wildcard(resolved);
    let working_dir = if working_dir.is_empty() {
        Path::new(".")
    } else {
        Path::new(working_dir)
    };

    let full_pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&working_dir.to_string_lossy()).trim_end_matches(['/', '\\']),
        suffix
    );

    let entries = glob::glob(&full_pattern).map_err(|e| TemplateError::InvalidPattern {
        pattern: resolved.to_string(),
        message: e.to_string(),
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    tracing::debug!(
        pattern = %resolved,
        matches = files.len(),
        "Expanded output wildcard"
    );

    Ok(files)
}
