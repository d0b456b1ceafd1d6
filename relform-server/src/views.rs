//! HTML for the form, confirmation and failure pages

use crate::validation::{SubmissionForm, OTHER_SUFFIX};
use relform_common::{Field, SubmissionRecord};
use std::collections::BTreeSet;

const MEDIA_CHOICES: [&str; 6] = ["YouTube", "Niconico", "piapro", "SoundCloud", "CD", "Download"];

const CHARACTER_CHOICES: [&str; 8] = [
    "初音ミク",
    "鏡音リン",
    "鏡音レン",
    "巡音ルカ",
    "KAITO",
    "MEIKO",
    "GUMI",
    "IA",
];

fn label(field: Field) -> &'static str {
    match field {
        Field::Category => "Release type",
        Field::Title => "Title",
        Field::Url => "Release URL",
        Field::Producer => "Producer",
        Field::LinkUrl => "Related link",
        Field::Media => "Media",
        Field::Date => "Release date",
        Field::Time => "Release time",
        Field::MovieAuthor => "Video by",
        Field::IllustAuthor => "Illustration by",
        Field::VocaloidChars => "Characters",
        Field::Twitter => "Contact (Twitter)",
        Field::Email => "Contact email",
        Field::Description => "Description",
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"ja\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{}</title>\n<link rel=\"stylesheet\" href=\"/static/style.css\">\n</head>\n\
         <body>\n{}\n</body>\n</html>\n",
        escape_html(title),
        body
    )
}

fn error_class(errors: &BTreeSet<Field>, field: Field) -> &'static str {
    if errors.contains(&field) {
        "error"
    } else {
        ""
    }
}

fn text_input(out: &mut String, form: &SubmissionForm, errors: &BTreeSet<Field>, field: Field) {
    let key = field.as_str();
    out.push_str(&format!(
        "<p><label for=\"relinfo_{key}\">{label}</label>\
         <input type=\"text\" id=\"relinfo_{key}\" name=\"relinfo[{key}]\" value=\"{value}\" class=\"{class}\"></p>\n",
        key = key,
        label = label(field),
        value = escape_html(form.text(field)),
        class = error_class(errors, field),
    ));
}

fn checkbox_set(
    out: &mut String,
    form: &SubmissionForm,
    errors: &BTreeSet<Field>,
    field: Field,
    choices: &[&str],
) {
    let key = field.as_str();
    let selected = form.list(field);
    out.push_str(&format!(
        "<fieldset id=\"relinfo_{}\" class=\"{}\"><legend>{}</legend>\n",
        key,
        error_class(errors, field),
        label(field)
    ));
    for (index, choice) in choices.iter().enumerate() {
        let checked = if selected.iter().any(|s| s == choice) {
            " checked=\"checked\""
        } else {
            ""
        };
        out.push_str(&format!(
            "<span class=\"checkbox-set\"><input type=\"checkbox\" id=\"relinfo_{key}_{index}\" \
             name=\"relinfo[{key}][]\" value=\"{value}\"{checked}>\
             <label for=\"relinfo_{key}_{index}\">{value}</label></span>\n",
            key = key,
            index = index,
            value = escape_html(choice),
            checked = checked,
        ));
    }
    out.push_str(&format!(
        "<label>Other <input type=\"text\" name=\"relinfo[{key}{suffix}]\" value=\"{value}\"></label></fieldset>\n",
        key = key,
        suffix = OTHER_SUFFIX,
        value = escape_html(form.other(field)),
    ));
}

/// Submission form, with submitted values and flagged fields on redisplay
pub fn form_page(form: &SubmissionForm, errors: &BTreeSet<Field>) -> String {
    let mut out = String::new();
    out.push_str("<h1>Release submission</h1>\n");

    if !errors.is_empty() {
        out.push_str("<ul class=\"errors\">\n");
        for field in errors {
            out.push_str(&format!(
                "<li data-field=\"{}\">{} needs attention</li>\n",
                field.as_str(),
                label(*field)
            ));
        }
        out.push_str("</ul>\n");
    }

    out.push_str("<form method=\"post\" action=\"/create\" enctype=\"multipart/form-data\">\n");
    for field in [
        Field::Category,
        Field::Title,
        Field::Url,
        Field::Producer,
        Field::LinkUrl,
    ] {
        text_input(&mut out, form, errors, field);
    }
    checkbox_set(&mut out, form, errors, Field::Media, &MEDIA_CHOICES);
    for field in [Field::Date, Field::Time, Field::MovieAuthor, Field::IllustAuthor] {
        text_input(&mut out, form, errors, field);
    }
    checkbox_set(&mut out, form, errors, Field::VocaloidChars, &CHARACTER_CHOICES);
    for field in [Field::Twitter, Field::Email] {
        text_input(&mut out, form, errors, field);
    }
    out.push_str(
        "<p><label for=\"relinfo_image_file\">Image</label>\
         <input type=\"file\" id=\"relinfo_image_file\" name=\"relinfo[image_file]\"></p>\n",
    );
    out.push_str(&format!(
        "<p><label for=\"relinfo_description\">{}</label>\
         <textarea id=\"relinfo_description\" name=\"relinfo[description]\" class=\"{}\">{}</textarea></p>\n",
        label(Field::Description),
        error_class(errors, Field::Description),
        escape_html(form.text(Field::Description)),
    ));
    out.push_str("<p><button type=\"submit\">Submit</button></p>\n</form>");

    page("Release submission", &out)
}

/// Confirmation page; blank when there is nothing to confirm
pub fn thanks_page(record: Option<&SubmissionRecord>) -> String {
    let Some(record) = record else {
        return page(
            "Submission",
            "<h1>Submission</h1>\n<p class=\"empty\">No submission to show.</p>\n<p><a href=\"/\">New submission</a></p>",
        );
    };

    let mut out = String::new();
    out.push_str(&format!(
        "<h1>Thank you</h1>\n<p>Your submission was received as <strong id=\"sequence\">#{:04}</strong> at {}.</p>\n",
        record.sequence,
        escape_html(&record.timestamp)
    ));
    out.push_str("<dl>\n");
    for field in Field::ALL {
        let value = record.fields.value(field);
        if value.is_empty() {
            continue;
        }
        out.push_str(&format!(
            "<dt>{}</dt><dd data-field=\"{}\">{}</dd>\n",
            label(field),
            field.as_str(),
            escape_html(&value)
        ));
    }
    if record.upload_attached() {
        out.push_str("<dt>Image</dt><dd data-field=\"image\">attached</dd>\n");
    }
    out.push_str("</dl>\n<p><a href=\"/\">New submission</a></p>");

    page("Thank you", &out)
}

pub fn failure_page(message: &str) -> String {
    page(
        "Submission failed",
        &format!(
            "<h1>Submission failed</h1>\n<p class=\"failure\">{}</p>\n<p><a href=\"/\">Back to the form</a></p>",
            escape_html(message)
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{validate, RawSubmission};
    use relform_common::ReleaseFields;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<a href=\"x\">Tom & Jerry's</a>"),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
    }

    #[test]
    fn test_redisplay_flags_fields_and_keeps_values() {
        let mut raw = RawSubmission::default();
        raw.set("title", "<script>");
        raw.push("media", "Niconico");
        let rejected = validate(&raw).unwrap_err();

        let html = form_page(&rejected.form, &rejected.errors);
        assert!(html.contains("<li data-field=\"producer\">"));
        assert!(!html.contains("<li data-field=\"title\">"));
        assert!(html.contains("value=\"&lt;script&gt;\""));
        assert!(html.contains("name=\"relinfo[media][]\" value=\"Niconico\" checked=\"checked\""));
        assert!(html.contains("id=\"relinfo_vocaloid_chars\" class=\"error\""));
    }

    #[test]
    fn test_blank_thanks_page() {
        let html = thanks_page(None);
        assert!(html.contains("No submission to show."));
    }

    #[test]
    fn test_thanks_page_shows_record() {
        let record = SubmissionRecord {
            sequence: 7,
            timestamp: "2024-07-07 07:07:07".to_string(),
            fields: ReleaseFields {
                title: "千本桜".to_string(),
                ..Default::default()
            },
            upload: None,
        };
        let html = thanks_page(Some(&record));
        assert!(html.contains("#0007"));
        assert!(html.contains("<dd data-field=\"title\">千本桜</dd>"));
        assert!(!html.contains("data-field=\"image\""));
    }
}
