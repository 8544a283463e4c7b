//! Prompt text sent to the model.

use crate::candidate::Candidate;
use crate::environment::EnvironmentFacts;
use crate::error_classifier::FailureReason;

/// Builds the system prompt describing the host the command will run on.
pub fn system_prompt(env: &EnvironmentFacts) -> String {
    format!(
        "You translate natural-language requests into a single {shell} shell command.

Environment:
- Operating system: {os}
- User: {user}
- Group: {group}
- Home directory: {home}
- Working directory: {cwd}
- Running as root: {root}
- Shell: {shell}

RULES:
- Reply with ONLY the command, nothing else.
- Do not use markdown, code fences, or backticks around the command.
- Multi-line commands are allowed when the shell syntax needs them.
- Prefer commands that are safe and available by default on this system.
- If the request cannot be done with a shell command, reply with one line that
  starts with '#' explaining why.",
        shell = env.shell,
        os = env.os,
        user = env.user,
        group = env.group,
        home = env.home_dir,
        cwd = env.working_dir,
        root = if env.is_root { "yes" } else { "no" },
    )
}

/// Asks for a new command that takes the user's adjustment into account.
pub fn refinement_prompt(request: &str, previous: &Candidate, refinement: &str) -> String {
    format!(
        "Original request: {request}

Previously suggested command:
{previous}

Adjust the command as follows: {refinement}

Reply with only the updated command.",
        request = request,
        previous = previous.command_text(),
        refinement = refinement,
    )
}

/// Asks for a corrected command after a failed run.
pub fn fix_prompt(
    request: &str,
    command: &Candidate,
    reason: &FailureReason,
    output: &str,
) -> String {
    format!(
        "Original request: {request}

This command was executed:
{command}

It failed ({reason}). Captured output:
{output}

Reply with only a corrected command that fulfils the original request.",
        request = request,
        command = command.command_text(),
        reason = reason,
        output = output,
    )
}
