//! Fixed instructions and messages used by the agent loop and the
//! auxiliary generations

/// Sentinel the agent emits when it is done and reporting a summary
pub const TERMINAL_MARKER: &str = "<task_summary>";

/// Summary reported when a run ends without a marker and without files
pub const FAILURE_SUMMARY: &str =
    "The agent did not complete the task and produced no files.";

/// Synthetic user message sent when the model stops making progress
pub const CONTINUE_NUDGE: &str = "You have not finished. If the task is complete, reply now with \
a short summary wrapped in <task_summary></task_summary>. Otherwise keep working using the tools.";

/// Default system instruction for the coding agent
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a senior software engineer working inside a sandboxed project directory (/home/user).

Tools:
- terminal: run shell commands (install packages, inspect the project). Never start dev servers.
- createOrUpdateFiles: write one or more files using relative paths such as "app/page.tsx".
- readFiles: read files before changing them.
- listFiles: explore the directory structure.

Guidelines:
- Build on the existing project when files are already present.
- Write complete, working code. No placeholders.
- Install dependencies with the terminal before importing them.

When the task is fully complete, reply with a short summary wrapped exactly like this:
<task_summary>
What was built or changed.
</task_summary>
Do not emit the summary before the work is done."#;

/// Instruction for the title generation
pub const TITLE_PROMPT: &str = "Generate a short, descriptive title (at most 3 words, title case, \
no punctuation or quotes) for the work described in the <task_summary>. Only return the raw title.";

/// Instruction for the user-facing response generation
pub const RESPONSE_PROMPT: &str = "Write a short, friendly message (1 to 3 sentences) telling the \
user what was just built or changed, based on the <task_summary>. Do not mention the tag. Plain text only.";

/// Title used when title generation fails or returns nothing
pub const FALLBACK_TITLE: &str = "Fragment";

/// Response used when response generation fails or returns nothing
pub const FALLBACK_RESPONSE: &str = "Here you go";

/// Content of the ERROR message persisted for failed runs
pub const ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

/// Summary returned by a job whose run produced none
pub const MISSING_SUMMARY: &str = "No summary available.";
