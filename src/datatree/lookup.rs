use std::collections::BTreeMap;

/// Substitute `{name}` placeholders in a lookup path template.
///
/// An unterminated `{` is kept literally.
///
/// # Errors
///
/// Returns the name of the first placeholder missing from `values`.
pub fn expand_lookup_path(
    template: &str,
    values: &BTreeMap<String, String>,
) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some((before, after)) = rest.split_once('{') {
        out.push_str(before);
        let Some((name, tail)) = after.split_once('}') else {
            out.push('{');
            rest = after;
            break;
        };
        let value = values.get(name.trim()).ok_or_else(|| name.trim().to_string())?;
        out.push_str(value);
        rest = tail;
    }
    out.push_str(rest);
    Ok(out)
}
