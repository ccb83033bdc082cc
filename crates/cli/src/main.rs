use anyhow::{bail, Context, Result};
use blockstore::Word;
use engine::Engine;

const USAGE: &str = "usage:
  undertow create <path>                  create a fresh database file
  undertow tables <path>                  list the catalog
  undertow scan <path> <type> [key...]    scan a table from a key prefix
  undertow intern <path> <string>         intern a string, print its id
  undertow string <path> <id>             look an interned string up";

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((cmd, rest)) = args.split_first() else {
        bail!("{USAGE}");
    };

    match (cmd.as_str(), rest) {
        ("create", [path]) => {
            Engine::create(path)?.close()?;
            println!("created {path}");
            Ok(())
        }
        ("tables", [path]) => {
            let e = Engine::open(path)?;
            scan(&e, 0, &[])
        }
        ("scan", [path, type_id, key @ ..]) => {
            let e = Engine::open(path)?;
            let type_id = parse_word(type_id)?;
            let key = key.iter().map(|w| parse_word(w)).collect::<Result<Vec<_>>>()?;
            scan(&e, type_id, &key)
        }
        ("intern", [path, s]) => {
            let e = Engine::open(path)?;
            let mut tx = e.begin()?;
            let id = tx.intern(s)?;
            tx.commit()?;
            println!("{id}");
            Ok(())
        }
        ("string", [path, id]) => {
            let e = Engine::open(path)?;
            println!("{}", e.lookup_string(parse_word(id)?)?);
            Ok(())
        }
        _ => bail!("{USAGE}"),
    }
}

fn parse_word(s: &str) -> Result<Word> {
    s.parse::<Word>().with_context(|| format!("not a word: {s}"))
}

fn scan(e: &Engine, type_id: Word, key: &[Word]) -> Result<()> {
    let mut c = e.get_entities(type_id, key);
    while c.next() {
        println!("{:?}", c.this());
    }
    if let Some(err) = c.take_err() {
        return Err(err.into());
    }
    Ok(())
}
