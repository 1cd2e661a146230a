use anyhow::Result;
use crossterm::event::{self, Event, KeyCode};

use libcw::audio::RodioSink;
use libcw::generator::Generator;
use libcw::morse::{text_to_morse, PracticeMode};

/// Per-keystroke typing mode: each character is rendered (or translated to
/// text) as soon as it is typed, Esc to quit.
pub fn interactive_mode(wpm: u32, tone: u32, gap: u32, text_output: bool, qrm: u8) -> Result<()> {
    println!("Interactive mode – type away (Esc to quit):\n");

    let mut gen = Generator::new(wpm, 0, gap, 50)?;
    gen.set_frequency(tone as i32)?;
    gen.set_qrm_level(qrm);
    if !text_output {
        gen.start(Box::new(RodioSink::new(44_100)))?;
    }

    loop {
        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Esc => break,
                KeyCode::Char(c) => {
                    let upper = c.to_ascii_uppercase().to_string();
                    if text_output {
                        match text_to_morse(&upper) {
                            Ok(morse) => println!("\n{}", morse),
                            Err(e) => eprintln!("\nError: {}", e),
                        }
                    } else if let Err(e) = gen.enqueue_string(&upper) {
                        eprintln!("\nAudio error: {}", e);
                    }
                }
                _ => {}
            }
        }
    }
    gen.stop();
    Ok(())
}

/// Practice mode: cycles through a built-in word list, sending each word and
/// waiting for Space (next), R (repeat), or Esc (quit).
pub fn practice_mode(
    wpm: u32,
    tone: u32,
    gap: u32,
    mode: PracticeMode,
    custom_text: Option<&str>,
    qrm: u8,
) -> Result<()> {
    let content = mode.get_content(custom_text);

    println!("Practice mode – {} words available", content.len());
    println!("Press Space for next, R to repeat, Esc to quit:\n");

    let mut gen = Generator::new(wpm, 0, gap, 50)?;
    gen.set_frequency(tone as i32)?;
    gen.set_qrm_level(qrm);
    gen.start(Box::new(RodioSink::new(44_100)))?;

    let mut current_index = 0;
    loop {
        let current_word = &content[current_index];
        println!("Current: {}", current_word);
        match text_to_morse(current_word) {
            Ok(morse) => println!("Morse: {}", morse),
            Err(e) => eprintln!("Error: {}", e),
        }
        if let Err(e) = gen.enqueue_string(current_word) {
            eprintln!("Audio error: {}", e);
        }

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Esc => break,
                KeyCode::Char(' ') => {
                    current_index = (current_index + 1) % content.len();
                }
                KeyCode::Char('r') | KeyCode::Char('R') => {
                    println!("Repeating: {}", current_word);
                }
                _ => {}
            }
        }
    }
    gen.stop();
    Ok(())
}
