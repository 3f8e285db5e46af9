//! Best-effort stack-trace rewriting through the bundle's source map.
//!
//! A pure text transform: frames labeled with the synthetic origin are
//! looked up in the current source map and rewritten to their original
//! `<source>:<line>:<column>` position; everything else - including frames
//! the map cannot fully resolve - is left untouched.

use regex::{Captures, Regex};
use std::path::Path;
use swc_sourcemap::SourceMap;

/// Virtual source-root prefix the bundler embeds in original source paths.
const VIRTUAL_SOURCE_ROOT: &str = "webpack://";

struct OriginalPosition {
    source: String,
    /// 1-based, matching V8 stack frames.
    line: u32,
    /// 0-based, matching source-map convention.
    column: u32,
}

/// Rewrite every `<origin_label>:<line>:<column>` occurrence in `stack` to
/// its original position, with the virtual source root replaced by the
/// compilation context so the result is an openable path.
pub fn rewrite_stack(
    stack: &str,
    origin_label: &str,
    source_map: &SourceMap,
    context: &Path,
) -> String {
    let pattern = format!(r"{}:(\d+):(\d+)", regex::escape(origin_label));
    let frame = match Regex::new(&pattern) {
        Ok(frame) => frame,
        Err(_) => return stack.to_string(),
    };

    frame
        .replace_all(stack, |captures: &Captures| {
            let resolved = captures[1]
                .parse::<u32>()
                .ok()
                .zip(captures[2].parse::<u32>().ok())
                .and_then(|(line, column)| original_position(source_map, context, line, column));
            match resolved {
                Some(position) => {
                    format!("{}:{}:{}", position.source, position.line, position.column)
                }
                None => captures[0].to_string(),
            }
        })
        .into_owned()
}

fn original_position(
    source_map: &SourceMap,
    context: &Path,
    line: u32,
    column: u32,
) -> Option<OriginalPosition> {
    // V8 frames are 1-based; token lookup is 0-based.
    let token = source_map.lookup_token(line.checked_sub(1)?, column.checked_sub(1)?)?;
    let source = token.get_source()?;
    Some(OriginalPosition {
        source: rebase_source(source, context),
        line: token.get_src_line() + 1,
        column: token.get_src_col(),
    })
}

fn rebase_source(source: &str, context: &Path) -> String {
    match source.strip_prefix(VIRTUAL_SOURCE_ROOT) {
        Some(rest) => format!(
            "{}/{}",
            context.display().to_string().trim_end_matches('/'),
            rest.trim_start_matches('/')
        ),
        None => source.to_string(),
    }
}
