use std::fmt::Write as _;

use crate::domain::{ApplicationRecord, SessionPrincipal};

const SITE_NAME: &str = "ShadowMC";

const BASE_STYLE: &str = "\
:root{--bg:#2a0006;--panel:#4a000b;--card:#5b000d;--accent:#ff1f3d;--text:#fff}
body{margin:0;font-family:Inter,system-ui,Segoe UI,Roboto,Arial,sans-serif;background:linear-gradient(180deg,var(--bg),#1d0004);color:var(--text)}
.wrap{max-width:760px;margin:8vh auto;padding:0 16px}
.wide{max-width:1200px}
.card{background:var(--panel);padding:20px;border-radius:14px;box-shadow:0 18px 50px rgba(0,0,0,.55)}
.top{display:flex;justify-content:space-between;align-items:center;margin-bottom:12px;gap:8px}
label{font-weight:700;display:block}
input,textarea{width:100%;box-sizing:border-box;margin:6px 0 12px;padding:10px;border-radius:10px;border:1px solid rgba(255,255,255,.12);background:var(--bg);color:#fff}
button,.btn{appearance:none;border:none;background:var(--accent);color:#fff;font-weight:800;border-radius:10px;padding:8px 12px;cursor:pointer;text-decoration:none}
.outline{border:2px solid rgba(255,255,255,.15);background:transparent}
.err{background:#681218;padding:10px;border-radius:10px;margin-bottom:12px}
.badge{padding:6px 10px;border-radius:999px;background:#7a1220}
table{width:100%;border-collapse:collapse}
th,td{border-bottom:1px solid rgba(255,255,255,.08);padding:8px 10px;vertical-align:top;text-align:left}
th{background:var(--card);position:sticky;top:0}
a{color:#fff}
";

/// Escapes text for element content and double- or single-quoted attributes.
fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn layout(title: &str, wrap_class: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\"/>\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"/>\n\
         <title>{SITE_NAME} | {title}</title>\n<style>\n{BASE_STYLE}</style>\n</head>\n\
         <body>\n<div class=\"{wrap_class}\">\n{body}\n</div>\n</body>\n</html>\n",
        title = escape_html(title),
    )
}

const APPLY_FIELDS: [(&str, &str, bool); 8] = [
    ("name", "Name", false),
    ("discord", "Discord", false),
    ("age", "Age", false),
    ("country", "Country", false),
    ("activity", "Daily activity", false),
    ("experience", "Experience", true),
    ("servers", "Servers worked in", true),
    ("why", "Why us?", true),
];

pub fn render_index() -> String {
    let mut fields = String::new();
    for (name, label, multiline) in APPLY_FIELDS {
        let _ = writeln!(fields, "<label for=\"{name}\">{label}</label>");
        if multiline {
            let _ = writeln!(
                fields,
                "<textarea id=\"{name}\" name=\"{name}\" rows=\"3\" required></textarea>"
            );
        } else {
            let _ = writeln!(fields, "<input id=\"{name}\" name=\"{name}\" required/>");
        }
    }

    let body = format!(
        "<div class=\"card\">\n<div class=\"top\"><h1 style=\"margin:0\">{SITE_NAME}</h1>\
         <a class=\"btn outline\" href=\"/admin\">Staff login</a></div>\n\
         <h2>Apply for staff</h2>\n\
         <form method=\"post\" action=\"/apply\">\n{fields}\
         <button type=\"submit\">Submit application</button>\n</form>\n</div>"
    );
    layout("Home", "wrap", &body)
}

pub fn render_applied() -> String {
    layout(
        "Applied",
        "wrap",
        "<div class=\"card\" style=\"text-align:center\">\n<h1>Thank you!</h1>\n\
         <p>Your application has been submitted.</p>\n\
         <a class=\"btn outline\" href=\"/\">← Back to ShadowMC</a>\n</div>",
    )
}

pub fn render_login(error: Option<&str>) -> String {
    let error = error
        .map(|msg| format!("<div class=\"err\">{}</div>\n", escape_html(msg)))
        .unwrap_or_default();
    let body = format!(
        "<div class=\"card\" style=\"max-width:420px;margin:0 auto\">\n\
         <div class=\"top\"><h2 style=\"margin:0\">Admin Login</h2><a href=\"/\">← Back</a></div>\n\
         {error}\
         <form method=\"post\" action=\"/admin/login\" autocomplete=\"off\">\n\
         <label for=\"username\">Username</label>\n<input id=\"username\" name=\"username\" required/>\n\
         <label for=\"password\">Password</label>\n\
         <input id=\"password\" name=\"password\" type=\"password\" required/>\n\
         <button type=\"submit\">Login</button>\n</form>\n</div>"
    );
    layout("Admin Login", "wrap", &body)
}

pub fn render_dashboard(principal: &SessionPrincipal, records: &[ApplicationRecord]) -> String {
    let mut rows = String::new();
    for r in records {
        rows.push_str("<tr>");
        for cell in [
            &r.created_at,
            &r.name,
            &r.discord_handle,
            &r.age,
            &r.country,
            &r.activity,
            &r.experience,
            &r.servers_worked_in,
            &r.why_us,
        ] {
            let _ = write!(rows, "<td>{}</td>", escape_html(cell));
        }
        rows.push_str("</tr>\n");
    }
    if rows.is_empty() {
        rows.push_str("<tr><td colspan=\"9\" style=\"opacity:.8\">No applications yet.</td></tr>\n");
    }

    let body = format!(
        "<div class=\"top\"><h2 style=\"margin:0\">Applications Dashboard</h2>\n\
         <div class=\"top\"><span class=\"badge\">{username} • {role}</span>\
         <a class=\"btn outline\" href=\"/\">Home</a>\
         <a class=\"btn\" href=\"/admin/download\">Download JSON</a>\
         <form method=\"post\" action=\"/admin/logout\" style=\"display:inline\">\
         <button type=\"submit\">Logout</button></form></div></div>\n\
         <div class=\"card\" style=\"overflow:auto;max-height:75vh\">\n<table>\n<thead><tr>\
         <th>Submitted</th><th>Name</th><th>Discord</th><th>Age</th><th>Country</th>\
         <th>Activity</th><th>Experience</th><th>Servers worked in</th><th>Why us</th>\
         </tr></thead>\n<tbody>\n{rows}</tbody>\n</table>\n</div>",
        username = escape_html(&principal.username),
        role = principal.role,
    );
    layout("Dashboard", "wrap wide", &body)
}

pub fn render_error(title: &str, message: &str) -> String {
    let body = format!(
        "<div class=\"card\">\n<h2>{}</h2>\n<p>{}</p>\n<a class=\"btn outline\" href=\"/\">← Home</a>\n</div>",
        escape_html(title),
        escape_html(message),
    );
    layout(title, "wrap", &body)
}
