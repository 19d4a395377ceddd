use model::QuizItem;
use serde::Deserialize;

/// Question text used when the generation backend produced nothing usable.
pub const FALLBACK_QUESTION: &str = "Unable to generate a question from this document.";

/// Loosely parsed question before it is checked against the option policy.
struct Draft {
    question: String,
    options: Vec<String>,
    answer: Option<usize>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnswerRef {
    Index(usize),
    Label(String),
}

#[derive(Deserialize)]
struct Candidate {
    question: String,
    #[serde(alias = "choices")]
    options: Vec<String>,
    #[serde(alias = "correct", alias = "correct_index")]
    answer: AnswerRef,
}

/// Lettered placeholder choices with the answer fixed at the first slot.
pub fn placeholder(question: String, count: usize) -> QuizItem {
    let options = (b'A'..=b'Z').take(count).map(|letter| char::from(letter).to_string()).collect();
    QuizItem { question, options, answer: 0 }
}

pub fn fallback(count: usize) -> QuizItem {
    placeholder(String::from(FALLBACK_QUESTION), count)
}

/// Reads the backend's reply as a question with exactly `count` choices. Replies that carry no
/// usable choices keep their question but receive placeholder choices instead.
pub fn parse(candidate: &str, count: usize) -> QuizItem {
    let body = strip_fence(candidate);
    let Some(Draft { question, options, answer }) = parse_json(body).or_else(|| parse_lettered(body)) else {
        return match first_line(body) {
            Some(line) => placeholder(String::from(line), count),
            None => fallback(count),
        };
    };

    if question.is_empty() {
        return fallback(count);
    }

    let answer = answer.and_then(|answer| u8::try_from(answer).ok());
    match answer {
        Some(answer) if options.len() == count => {
            let item = QuizItem { question, options, answer };
            match item.validate() {
                Ok(()) => item,
                Err(_) => placeholder(item.question, count),
            }
        }
        _ => placeholder(question, count),
    }
}

fn strip_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    // Drop the info string (e.g. `json`) on the opening fence.
    let body = rest.split_once('\n').map_or("", |(_, body)| body).trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Strips a case-insensitive `label` such as `answer:` from the start of `line`.
fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label).then(|| line[label.len()..].trim())
}

fn strip_question_label(line: &str) -> &str {
    strip_label(line, "question:").or_else(|| strip_label(line, "q:")).unwrap_or(line)
}

/// Reads an answer given either as the text of a choice or as its letter.
fn resolve_answer(label: &str, options: &[String]) -> Option<usize> {
    let label = label.trim();
    options
        .iter()
        .position(|option| option == label)
        .or_else(|| options.iter().position(|option| option.eq_ignore_ascii_case(label)))
        .or_else(|| letter_index(label))
}

fn letter_index(label: &str) -> Option<usize> {
    let label = label.trim().trim_start_matches('(');
    let mut chars = label.chars();
    let letter = chars.next()?;
    if !letter.is_ascii_alphabetic() || chars.next().is_some_and(char::is_alphanumeric) {
        return None;
    }
    Some(usize::from(letter.to_ascii_uppercase() as u8 - b'A'))
}

/// Matches lines such as `A) text`, `b. text` and `(C) text`.
fn option_line(line: &str) -> Option<&str> {
    let rest = line.strip_prefix('(').unwrap_or(line);
    let mut chars = rest.char_indices();
    let (_, letter) = chars.next()?;
    let (index, delimiter) = chars.next()?;
    if !letter.is_ascii_alphabetic() || !matches!(delimiter, ')' | '.' | ':') {
        return None;
    }
    let text = rest[index + delimiter.len_utf8()..].trim();
    (!text.is_empty()).then_some(text)
}

fn first_line(body: &str) -> Option<&str> {
    body.lines().map(str::trim).find(|line| !line.is_empty()).map(strip_question_label).filter(|line| !line.is_empty())
}

fn parse_json(body: &str) -> Option<Draft> {
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    let Candidate { question, options, answer } = serde_json::from_str(body.get(start..=end)?).ok()?;
    let options: Vec<_> = options.into_iter().map(|option| String::from(option.trim())).collect();
    let answer = match answer {
        AnswerRef::Index(index) => Some(index),
        AnswerRef::Label(label) => resolve_answer(&label, &options),
    };
    Some(Draft { question: String::from(question.trim()), options, answer })
}

fn parse_lettered(body: &str) -> Option<Draft> {
    let mut question = None;
    let mut options = Vec::new();
    let mut label = None;
    for line in body.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if let Some(found) = strip_label(line, "answer:").or_else(|| strip_label(line, "correct answer:")) {
            label = Some(found);
        } else if question.is_none() {
            question = Some(strip_question_label(line));
        } else if let Some(option) = option_line(line) {
            options.push(String::from(option));
        }
    }

    if options.is_empty() {
        return None;
    }

    // The answer line may precede the choices it names.
    let answer = label.and_then(|label| resolve_answer(label, &options));
    Some(Draft { question: String::from(question?), options, answer })
}
