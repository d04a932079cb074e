use crate::error::BlockError;
use crate::registry::BlockRegistry;
use crate::rules::{expanded_field, ARGS_FIELD};
use crate::workspace::{ArgMode, BlockId, Workspace};
use tracing::debug;

pub fn to_compact(values: &[String]) -> String {
    values.join(", ")
}

/// Splits an argument list on top-level commas. Commas inside brackets or string
/// literals stay with their piece.
pub fn split_args(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in text.chars() {
        if let Some(q) = quote {
            current.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                current.push(ch);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                pieces.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    pieces.push(current.trim().to_string());
    pieces
}

/// One value per parameter. Missing or empty pieces fall back to the parameter
/// name; surplus pieces are folded into the last parameter.
pub fn to_expanded(text: &str, params: &[String]) -> Vec<String> {
    let pieces = split_args(text);
    let mut values: Vec<String> = params
        .iter()
        .enumerate()
        .map(|(index, param)| match pieces.get(index) {
            Some(piece) if !piece.is_empty() => piece.clone(),
            _ => param.clone(),
        })
        .collect();
    if let Some(last) = params.len().checked_sub(1) {
        if pieces.len() > params.len() {
            let surplus = pieces[last..]
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .collect::<Vec<_>>();
            if !surplus.is_empty() {
                values[last] = to_compact(&surplus);
            }
        }
    }
    values
}

pub fn toggle_arg_mode(
    workspace: &mut Workspace,
    registry: &BlockRegistry,
    id: BlockId,
) -> Result<ArgMode, BlockError> {
    let block = workspace.get(id)?;
    let definition = registry.lookup(&block.type_id)?;
    let Some(call) = definition.call_rule().filter(|c| !c.params.is_empty()) else {
        return Err(BlockError::NotToggleable(block.type_id.clone()));
    };
    let params = &call.params;

    let block = workspace.get_mut(id)?;
    let mode = match block.arg_mode {
        ArgMode::Compact => {
            let text = block
                .fields
                .remove(ARGS_FIELD)
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| params.join(", "));
            for (index, value) in to_expanded(&text, params).into_iter().enumerate() {
                block.fields.insert(expanded_field(index), value);
            }
            ArgMode::Expanded
        }
        ArgMode::Expanded => {
            let values = params
                .iter()
                .enumerate()
                .map(|(index, param)| {
                    block
                        .fields
                        .remove(&expanded_field(index))
                        .filter(|v| !v.trim().is_empty())
                        .unwrap_or_else(|| param.clone())
                })
                .collect::<Vec<_>>();
            block.fields.insert(ARGS_FIELD.to_string(), to_compact(&values));
            ArgMode::Compact
        }
    };
    block.arg_mode = mode;
    debug!(block = %id, ?mode, "argument mode toggled");
    Ok(mode)
}
