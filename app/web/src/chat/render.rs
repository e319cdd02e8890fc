use std::collections::HashMap;

// the render layer only interpolates {{key}} placeholders into embedded
// templates, the core never formats html beyond these substitutions
pub fn html(template: &str, values: &HashMap<&str, String>) -> String {
    let mut page = template.to_string();
    for (key, value) in values {
        page = page.replace(&format!("{{{{{key}}}}}"), value);
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_substituted() {
        let values = HashMap::from([("model", "gpt-3.5-turbo".to_string()), ("stream", "true".to_string())]);
        let page = html("<p>{{model}} stream={{stream}}</p>", &values);
        assert_eq!(page, "<p>gpt-3.5-turbo stream=true</p>");
    }

    #[test]
    fn unknown_placeholders_are_left_alone() {
        let page = html("{{missing}}", &HashMap::new());
        assert_eq!(page, "{{missing}}");
    }
}
