//! 命令模板展开
//!
//! 把参数中的 `$NAME` 替换为对应取值。每个参数独立展开，结果直接作为
//! argv 交给进程执行，不经过 shell，取值中的任何字符都不会被再次解析。

use std::collections::HashMap;

const SIGIL: char = '$';

/// 展开整个命令模板，参数个数和边界保持不变
pub fn expand(template: &[String], values: &HashMap<String, String>) -> Vec<String> {
    template.iter().map(|arg| expand_arg(arg, values)).collect()
}

/// 展开单个参数
///
/// 未知的占位符原样保留；替换结果不会再次扫描。
pub fn expand_arg(arg: &str, values: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;

    while let Some(pos) = rest.find(SIGIL) {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + SIGIL.len_utf8()..];
        let name_len = identifier_len(after);

        if name_len == 0 {
            out.push(SIGIL);
            rest = after;
            continue;
        }

        let name = &after[..name_len];
        match values.get(name) {
            Some(value) => out.push_str(value),
            None => {
                out.push(SIGIL);
                out.push_str(name);
            }
        }
        rest = &after[name_len..];
    }

    out.push_str(rest);
    out
}

/// `[A-Za-z_][A-Za-z0-9_]*` 的字节长度
fn identifier_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map_or(s.len(), |(i, _)| i)
}
