//! HTML representations.
//!
//! Pages are plain `format!` templates behind the [`HtmlRenderer`] trait so a
//! deployment can swap in its own look.

use std::fmt::Write;

use super::format::{PermissionListView, ProjectListItem, ProjectView, RecordView};

pub trait HtmlRenderer: Send + Sync {
    fn record(&self, record: &RecordView<'_>) -> String;
    fn project(&self, project: &ProjectView) -> String;
    fn project_list(&self, projects: &[ProjectListItem]) -> String;
    fn permission_list(&self, permissions: &PermissionListView) -> String;
    fn login(&self, next: &str, error: Option<&str>) -> String;
}

/// Escape text for element content and quoted attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Minimal built-in pages
#[derive(Debug, Clone, Default)]
pub struct BasicHtmlRenderer;

impl BasicHtmlRenderer {
    fn page(title: &str, body: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <style>
        body {{ font-family: sans-serif; margin: 2em; }}
        table {{ border-collapse: collapse; }}
        th, td {{ border: 1px solid #ccc; padding: 4px 8px; text-align: left; vertical-align: top; }}
        pre {{ margin: 0; white-space: pre-wrap; }}
    </style>
</head>
<body>
<h1>{title}</h1>
{body}
</body>
</html>
"#,
            title = escape(title),
            body = body
        )
    }

    fn row(out: &mut String, name: &str, value: &str) {
        let _ = writeln!(out, "<tr><th>{}</th><td>{}</td></tr>", escape(name), value);
    }

    fn json(value: &impl serde::Serialize) -> String {
        match serde_json::to_string_pretty(value) {
            Ok(text) => format!("<pre>{}</pre>", escape(&text)),
            Err(_) => String::new(),
        }
    }
}

impl HtmlRenderer for BasicHtmlRenderer {
    fn record(&self, record: &RecordView<'_>) -> String {
        let mut rows = String::new();
        Self::row(&mut rows, "Project", &escape(record.project_id));
        Self::row(&mut rows, "Timestamp", &escape(&record.timestamp.to_string()));
        Self::row(&mut rows, "Reason", &escape(record.reason));
        Self::row(&mut rows, "Outcome", &escape(record.outcome));
        Self::row(
            &mut rows,
            "Tags",
            &escape(&record.tags.iter().cloned().collect::<Vec<_>>().join(", ")),
        );
        Self::row(&mut rows, "User", &escape(record.user));
        Self::row(&mut rows, "Main file", &escape(record.main_file.unwrap_or("")));
        Self::row(&mut rows, "Version", &escape(record.version.unwrap_or("")));
        Self::row(&mut rows, "Arguments", &escape(record.script_arguments));
        Self::row(&mut rows, "Executable", &Self::json(&record.executable));
        Self::row(&mut rows, "Parameters", &Self::json(&record.parameters));
        Self::row(&mut rows, "Launch mode", &Self::json(&record.launch_mode));
        Self::row(&mut rows, "Output data", &Self::json(&record.output_data));
        Self::row(&mut rows, "Dependencies", &Self::json(&record.dependencies));
        Self::row(&mut rows, "Platforms", &Self::json(&record.platforms));
        Self::row(
            &mut rows,
            "Output",
            &format!("<pre>{}</pre>", escape(record.stdout_stderr)),
        );
        Self::page(record.label, &format!("<table>\n{}</table>", rows))
    }

    fn project(&self, project: &ProjectView) -> String {
        let mut body = format!("<p>{}</p>\n<ul>\n", escape(&project.description));
        for uri in &project.records {
            let _ = writeln!(body, "<li><a href=\"{0}\">{0}</a></li>", escape(uri));
        }
        body.push_str("</ul>\n");
        if let Some(tags) = &project.tags {
            let _ = writeln!(body, "<p>Filtered by tag: {}</p>", escape(tags));
        }
        if let Some(access) = &project.access {
            let _ = writeln!(body, "<p>Access: {}</p>", escape(&access.join(", ")));
        }
        Self::page(&project.name, &body)
    }

    fn project_list(&self, projects: &[ProjectListItem]) -> String {
        let mut rows = String::from("<tr><th>Project</th><th>Description</th><th>Last updated</th></tr>\n");
        for project in projects {
            let updated = project.last_updated.map(|ts| ts.to_string()).unwrap_or_default();
            let _ = writeln!(
                rows,
                "<tr><td><a href=\"{}\">{}</a></td><td>{}</td><td>{}</td></tr>",
                escape(&project.uri),
                escape(&project.name),
                escape(&project.description),
                escape(&updated)
            );
        }
        Self::page("Projects", &format!("<table>\n{}</table>", rows))
    }

    fn permission_list(&self, permissions: &PermissionListView) -> String {
        let mut body = String::from("<ul>\n");
        for user in &permissions.access {
            let _ = writeln!(body, "<li>{}</li>", escape(user));
        }
        body.push_str(
            "</ul>\n<form method=\"post\">\n<input name=\"user\" placeholder=\"username\">\n\
             <button type=\"submit\">Grant access</button>\n</form>\n",
        );
        Self::page(&format!("{}: permissions", permissions.name), &body)
    }

    fn login(&self, next: &str, error: Option<&str>) -> String {
        let mut body = String::new();
        if let Some(error) = error {
            let _ = writeln!(body, "<p class=\"error\">{}</p>", escape(error));
        }
        let _ = write!(
            body,
            r#"<form method="post">
<input type="hidden" name="next" value="{}">
<p><label>Username <input name="username"></label></p>
<p><label>Password <input type="password" name="password"></label></p>
<button type="submit">Log in</button>
</form>
"#,
            escape(next)
        );
        Self::page("Log in", &body)
    }
}
