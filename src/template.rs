use crate::metadata::TemplateContext;

/// Default title template when none is configured
pub const DEFAULT_TITLE_TEMPLATE: &str = "{basename}";

/// Default description template when none is configured
pub const DEFAULT_DESCRIPTION_TEMPLATE: &str = "{basename}\nRecorded on {update_date}";

/// Render a template against the context.
///
/// Unknown placeholder names resolve to an empty string. Malformed brace
/// structure (unclosed `{`, nested `{`, stray `}`) blanks the entire result.
pub fn render(template: &str, ctx: &TemplateContext) -> String {
    try_render(template, ctx).unwrap_or_default()
}

/// Render, substituting `fallback` when the result is blank
pub fn render_or(template: &str, ctx: &TemplateContext, fallback: &str) -> String {
    let rendered = render(template, ctx);
    if rendered.trim().is_empty() {
        fallback.to_string()
    } else {
        rendered
    }
}

/// Returns None on malformed brace structure
fn try_render(template: &str, ctx: &TemplateContext) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        let (literal, tail) = rest.split_at(pos);
        out.push_str(literal);

        if tail.starts_with('}') {
            return None;
        }

        // tail starts with '{'
        let body = &tail[1..];
        let close = body.find('}')?;
        let name = &body[..close];
        if name.contains('{') {
            return None;
        }

        out.push_str(ctx.lookup(name.trim()).unwrap_or(""));
        rest = &body[close + 1..];
    }

    out.push_str(rest);
    Some(out)
}

/// Platform limit on title length, in characters
pub const MAX_TITLE_CHARS: usize = 100;

/// Strip characters the platform rejects in titles and descriptions
pub fn sanitize_text(text: &str) -> String {
    text.chars().filter(|c| *c != '<' && *c != '>').collect()
}

/// Sanitize and clamp a title to the platform limit
pub fn finalize_title(title: &str) -> String {
    let clean = sanitize_text(title);
    if clean.chars().count() <= MAX_TITLE_CHARS {
        return clean;
    }
    tracing::warn!("Title longer than {} characters, truncating: {}", MAX_TITLE_CHARS, clean);
    clean.chars().take(MAX_TITLE_CHARS).collect()
}
