use textwrap::Options;

const WRAP_WIDTH: usize = 88;

/// One rendered element of a resume or cover letter.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title(String),
    Contact(String),
    Heading(String),
    Subheading(String),
    Detail(String),
    Paragraph(String),
    Bullet(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    blocks: Vec<Block>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Renders to Markdown, wrapping prose and bullets.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let mut previous: Option<&Block> = None;

        for block in &self.blocks {
            let bullet_run = matches!(
                (previous, block),
                (Some(Block::Bullet(_)), Block::Bullet(_)) | (Some(Block::Subheading(_)), Block::Detail(_))
            );
            if previous.is_some() && !bullet_run {
                out.push('\n');
            }

            match block {
                Block::Title(text) => out.push_str(&format!("# {}\n", text.trim())),
                Block::Contact(text) => out.push_str(&format!("{}\n", text.trim())),
                Block::Heading(text) => out.push_str(&format!("## {}\n", text.trim())),
                Block::Subheading(text) => out.push_str(&format!("### {}\n", text.trim())),
                Block::Detail(text) => out.push_str(&format!("*{}*\n", text.trim())),
                Block::Paragraph(text) => {
                    for (i, line) in text.trim().lines().enumerate() {
                        if i > 0 {
                            out.push('\n');
                        }
                        out.push_str(&textwrap::fill(line, WRAP_WIDTH));
                    }
                    out.push('\n');
                }
                Block::Bullet(text) => {
                    let options = Options::new(WRAP_WIDTH)
                        .initial_indent("- ")
                        .subsequent_indent("  ");
                    out.push_str(&textwrap::fill(text.trim(), options));
                    out.push('\n');
                }
            }
            previous = Some(block);
        }
        out
    }
}
