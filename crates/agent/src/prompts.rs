use std::fmt::Write as _;

use shelfwise_core::domain::catalog::Isbn;

use crate::executor::OperationResult;
use crate::operations::OperationKind;

pub fn analysis_prompt(user_request: &str) -> String {
    let mut catalog = String::new();
    for kind in OperationKind::ALL {
        let _ = writeln!(catalog, "- {}: {}", kind.name(), kind.description());
    }

    format!(
        r#"Analyze this library management request and determine if tools are needed.

USER REQUEST: "{user_request}"

AVAILABLE TOOLS:
{catalog}
CRITICAL: You MUST use the create_order tool when the user mentions:
- Selling books to customers
- Creating orders
- Processing sales
- Customer purchases

Respond with ONLY this JSON format (no other text):
{{
    "needs_tools": true or false,
    "tools_needed": ["tool1", "tool2"],
    "reasoning": "Brief explanation",
    "action_type": "order|search|inventory|knowledge|other"
}}"#
    )
}

/// `titles` is the live `(isbn, title)` list read from the catalog.
pub fn planning_prompt(
    user_request: &str,
    operations: &[OperationKind],
    titles: &[(Isbn, String)],
) -> String {
    let names = operations.iter().map(|kind| kind.name()).collect::<Vec<_>>().join(", ");

    let mut mapping = String::new();
    for (isbn, title) in titles {
        let _ = writeln!(mapping, "- \"{}\": {isbn}", title.to_lowercase());
    }
    if mapping.is_empty() {
        mapping.push_str("- (catalog is empty)\n");
    }

    let mut contracts = String::new();
    for kind in operations {
        let _ = writeln!(contracts, "- {}: {}", kind.name(), kind.contract().render());
    }

    format!(
        r#"Based on this user request: "{user_request}"

Determine parameters for these tools: {names}

BOOK ISBN MAPPING (USE THESE EXACT ISBNs):
{mapping}
TOOL PARAMETERS:
{contracts}
IMPORTANT:
- For book titles, use the EXACT ISBN from the mapping above
- create_order automatically adjusts stock - no need for restock_book
- restock_book quantity must be positive

Return ONLY a JSON array (no other text):
[
    {{
        "tool_name": "tool_name",
        "parameters": {{ ... }},
        "reasoning": "why these parameters"
    }}
]"#
    )
}

pub fn synthesis_prompt(
    user_request: &str,
    analysis_reasoning: &str,
    results: &[OperationResult],
) -> String {
    let mut rendered = String::new();
    for result in results {
        let _ = writeln!(
            rendered,
            "Tool: {}\nResult: {}\nSuccess: {}\n",
            result.name, result.output, result.success
        );
    }
    if rendered.is_empty() {
        rendered.push_str("(no tools were executed)\n");
    }

    format!(
        r#"You are a helpful library desk assistant. Based on the user's request and the results from the tools executed,
provide a clear, helpful final response to the user.

User's original request: "{user_request}"

Analysis of request: {analysis_reasoning}

Tools executed and their results:
{rendered}
Please provide:
1. A natural, conversational response that directly addresses the user's request
2. Include relevant information from the tool results
3. If any tools failed, mention this politely and suggest alternatives
4. Keep the response helpful and professional
5. Don't mention the internal tools or technical details unless necessary

Respond with just the final message to the user."#
    )
}
