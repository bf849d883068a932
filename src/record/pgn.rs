use crate::prelude::*;

/// PGN import format keeps lines below this many characters.
const LINE_WIDTH: usize = 79;

/// Renders one path as a standalone PGN game, with the analysis prefix played out first.
pub fn render(root: &Root, path: &CompletedPath, number: usize) -> Result<String>
{
    let mut headers = vec![
        ("Event", "Opening exploration".to_owned()),
        ("Site", "?".to_owned()),
        ("Date", "????.??.??".to_owned()),
        ("Round", number.to_string()),
        ("White", "?".to_owned()),
        ("Black", "?".to_owned()),
        ("Result", "*".to_owned()),
        ("Variation", number.to_string()),
    ];

    if let Some(fen) = root.fen()
    {
        headers.push(("SetUp", "1".to_owned()));
        headers.push(("FEN", fen.to_owned()));
    }

    let (turn, fullmoves) = root.numbering();
    let mut movetext = root.prefix().then(&path.line)?.movetext(turn, fullmoves);

    let comment = match path.score
    {
        | Some(score) => format!("{{ {}; {} }}", score, path.leaf),
        | None => format!("{{ {} }}", path.leaf),
    };
    if !movetext.is_empty()
    {
        movetext.push(' ');
    }
    movetext.push_str(&comment);
    movetext.push_str(" *");

    let mut pgn = headers
        .into_iter()
        .map(|(name, value)| format!("[{} \"{}\"]\n", name, escape(&value)))
        .collect::<String>();
    pgn.push('\n');
    pgn.push_str(&wrap(&movetext));
    pgn.push('\n');
    Ok(pgn)
}

fn escape(value: &str) -> String
{
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Breaks movetext into lines at word boundaries.
fn wrap(text: &str) -> String
{
    let mut lines = vec![String::new()];
    for word in text.split_whitespace()
    {
        let Some(current) = lines.last_mut()
        else
        {
            break;
        };

        if current.is_empty()
        {
            current.push_str(word);
        }
        else if current.len() + 1 + word.len() <= LINE_WIDTH
        {
            current.push(' ');
            current.push_str(word);
        }
        else
        {
            lines.push(word.to_owned());
        }
    }
    lines.join("\n")
}
