use itertools::Itertools;

use super::JobLevel;

pub fn build(resume_text: &str, role: &str, level: JobLevel, speakers: &[&str]) -> String {
    let panel = speakers.iter().join(" and ");
    let format = speakers
        .iter()
        .map(|speaker| format!("{speaker}: <text>"))
        .join("\\n");

    format!(
        r#"You are {count} senior HR executives ({panel}) evaluating a candidate's resume for the role of {role}. It is a {level} level job.
Here is the candidate's resume:

{resume_text}

Now hold a humorous conversation with each other in which you give critical feedback, roast the resume, and suggest improvements.
- Keep the tone conversational
- Do not use markdown, emojis, or any other formatting. Write only what a text-to-speech engine can read aloud
- Do not write anything in braces or brackets
- Do not describe emotions or actions such as (laughs)
- Every line must look like: "{format}\n..."
- Do not forget to suggest the improvements"#,
        count = speakers.len(),
    )
}
