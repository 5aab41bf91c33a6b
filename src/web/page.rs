use itertools::Itertools;
use strum::IntoEnumIterator;

use crate::dialogue::JobLevel;
use crate::pipeline::Feedback;

const TITLE: &str = "Resume Feedback Generator";

fn layout(body: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{TITLE}</title>\n</head>\n<body>\n<h1>{TITLE}</h1>\n{body}\n</body>\n</html>\n"
    )
}

pub fn form() -> String {
    let options = JobLevel::iter()
        .map(|level| format!("<option value=\"{level}\">{level}</option>"))
        .join("\n");

    layout(&format!(
        r#"<form action="/feedback" method="post" enctype="multipart/form-data">
<p><label>Upload your resume (PDF or DOCX) <input type="file" name="resume" accept=".pdf,.docx"></label></p>
<p><label>Enter the job role: <input type="text" name="role"></label></p>
<p><label>Select job level: <select name="level">
{options}
</select></label></p>
<p><button type="submit">Generate Feedback</button></p>
</form>"#
    ))
}

pub fn feedback(feedback: &Feedback, audio_url: &str) -> String {
    layout(&format!(
        r#"<p class="success">Feedback generated successfully!</p>
<h2>HR Feedback:</h2>
<pre>{dialogue}</pre>
<audio controls src="{audio_url}"></audio>
<p>Time taken for feedback generation: {seconds:.2} seconds</p>
<p><a href="/">Try another resume</a></p>"#,
        dialogue = escape(&feedback.dialogue),
        audio_url = escape(audio_url),
        seconds = feedback.elapsed.as_secs_f64(),
    ))
}

pub fn error(message: &str) -> String {
    layout(&format!(
        "<p class=\"error\">{}</p>\n<p><a href=\"/\">Back</a></p>",
        escape(message)
    ))
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
