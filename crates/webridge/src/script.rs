use crate::method::MethodSet;
use serde::Serialize;
use std::fmt::Write as _;

/// The binding namespace could not be projected into script.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// The binding name must be usable verbatim as a script identifier.
    #[error("binding name {0:?} is not a valid script identifier")]
    InvalidName(String),
}

// Style-element injector from the native layer's CSS support, applied to an
// escaped stylesheet string.
const CSS_INJECT_FUNCTION: &str = "(function(e){var \
t=document.createElement('style'),d=document.head||document.\
getElementsByTagName('head')[0];t.setAttribute('type','text/\
css'),t.styleSheet?t.styleSheet.cssText=e:t.appendChild(document.\
createTextNode(e)),d.appendChild(t)})";

/// Script text that declares the namespace object if absent and defines one
/// forwarding function per descriptor. Each function takes exactly `arity`
/// positional parameters and serializes them as the invoke payload.
pub(crate) fn projection<T>(name: &str, methods: &MethodSet<T>) -> Result<String, ProjectionError> {
    if !is_script_identifier(name) {
        return Err(ProjectionError::InvalidName(name.to_string()));
    }

    let mut js = String::new();
    let _ = writeln!(js, "if (typeof {name} === 'undefined') {{ {name} = {{}}; }}");
    for method in methods.descriptors() {
        let args = positional_args(method.arity());
        let _ = writeln!(
            js,
            "{name}.{method_name} = function({args}) {{ \
             window.external.invoke(JSON.stringify(\
             {{scope: \"{name}\", method: \"{method_name}\", params: [{args}]}})); }};",
            method_name = method.js_name(),
        );
    }
    Ok(js)
}

/// Script text that installs the current state under `<name>.data` and
/// notifies the optional render hook. Fails when the value cannot be encoded
/// (the sync-time serialization error).
pub(crate) fn sync_script<T: Serialize>(
    name: &str,
    value: &T,
) -> Result<String, serde_json::Error> {
    let data = serde_json::to_string(value)?;
    Ok(format!(
        "{name}.data={data};if({name}.render){{{name}.render({data});}}"
    ))
}

/// Script text that injects a stylesheet through the script runtime.
pub(crate) fn css_inject_script(css: &str) -> String {
    format!("{CSS_INJECT_FUNCTION}(\"{}\")", js_encode(css))
}

fn positional_args(arity: usize) -> String {
    let mut args = String::new();
    for i in 0..arity {
        if i > 0 {
            args.push(',');
        }
        let _ = write!(args, "a{i}");
    }
    args
}

fn is_script_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    }
}

// Escape text for embedding in a double-quoted script string literal.
// Printable ASCII passes through except `<>\'"`; everything else becomes a
// \xNN byte escape.
fn js_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        let literal = (0x20..0x80).contains(&byte)
            && !matches!(byte, b'<' | b'>' | b'\\' | b'\'' | b'"');
        if literal {
            out.push(byte as char);
        } else {
            let _ = write!(out, "\\x{byte:02x}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::MethodSet;
    use serde::Serialize;

    struct Counter;

    fn counter_methods() -> MethodSet<Counter> {
        MethodSet::new()
            .op1("Add", |_: &mut Counter, _n: i64| {})
            .expect("Add")
            .op0("Reset", |_: &mut Counter| {})
            .expect("Reset")
    }

    #[test]
    fn projection_declares_namespace_and_forwarders() {
        let js = projection("counter", &counter_methods()).expect("projection");

        assert!(js.contains("if (typeof counter === 'undefined') { counter = {}; }"));
        assert!(js.contains(
            "counter.add = function(a0) { window.external.invoke(JSON.stringify(\
             {scope: \"counter\", method: \"add\", params: [a0]})); };"
        ));
        assert!(js.contains(
            "counter.reset = function() { window.external.invoke(JSON.stringify(\
             {scope: \"counter\", method: \"reset\", params: []})); };"
        ));
    }

    #[test]
    fn projection_rejects_non_identifier_names() {
        let methods = counter_methods();
        assert!(matches!(
            projection("my counter", &methods),
            Err(ProjectionError::InvalidName(_))
        ));
        assert!(projection("", &methods).is_err());
        assert!(projection("1counter", &methods).is_err());
        assert!(projection("$app", &methods).is_ok());
    }

    #[test]
    fn sync_script_assigns_data_and_guards_render_hook() {
        #[derive(Serialize)]
        struct State {
            value: i64,
        }

        let js = sync_script("counter", &State { value: 5 }).expect("sync script");
        assert_eq!(
            js,
            "counter.data={\"value\":5};\
             if(counter.render){counter.render({\"value\":5});}"
        );
    }

    #[test]
    fn serialization_is_idempotent() {
        #[derive(Serialize)]
        struct State {
            value: i64,
            label: String,
        }

        let state = State {
            value: 3,
            label: "x".into(),
        };
        let encoded = serde_json::to_string(&state).expect("encode");
        let decoded: serde_json::Value = serde_json::from_str(&encoded).expect("decode");
        let re_encoded = serde_json::to_string(&decoded).expect("re-encode");
        assert_eq!(encoded, re_encoded);
    }

    #[test]
    fn css_inject_escapes_quotes_and_newlines() {
        let js = css_inject_script("body { color: \"red\" }\n");
        assert!(js.starts_with("(function(e){var "));
        assert!(js.ends_with("(\"body { color: \\x22red\\x22 }\\x0a\")"));
    }
}
