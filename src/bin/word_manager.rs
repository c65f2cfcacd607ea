use clap::{Arg, ArgMatches, Command};
use wordle_duel::config::Config;
use wordle_duel::word_list::WordList;

fn arg<'a>(args: &'a ArgMatches, name: &str) -> &'a str {
    // clap 保证必填参数存在
    args.value_of(name).unwrap_or_default()
}

fn cli() -> Command<'static> {
    Command::new("单词管理器")
        .version("1.0")
        .about("管理 Wordle 谜底词库")
        .subcommand_required(true)
        .subcommand(Command::new("list").about("列出所有分类和单词"))
        .subcommand(
            Command::new("add")
                .about("添加单词到分类")
                .arg(Arg::new("category").help("分类名称").required(true).index(1))
                .arg(Arg::new("word").help("5个字母的单词").required(true).index(2)),
        )
        .subcommand(
            Command::new("remove")
                .about("从所有分类中删除单词")
                .arg(Arg::new("word").help("要删除的单词").required(true).index(1)),
        )
        .subcommand(Command::new("stats").about("显示词库统计信息"))
        .subcommand(Command::new("validate").about("验证词库完整性"))
        .subcommand(
            Command::new("export").about("导出词库到文件").arg(
                Arg::new("file")
                    .help("输出文件路径")
                    .required(true)
                    .index(1),
            ),
        )
}

fn save(word_list: &WordList) -> wordle_duel::Result<()> {
    let path = word_list
        .file_path()
        .ok_or_else(|| wordle_duel::Error::WordList("未配置词库文件路径".to_string()))?;
    word_list.save_to_file(path)
}

fn run(matches: &ArgMatches) -> wordle_duel::Result<()> {
    Config::init()?;
    // 文件损坏时直接报错，避免用默认词库覆盖
    let mut word_list = WordList::open(&Config::get().word_list.file_path)?;

    match matches.subcommand() {
        Some(("list", _)) => {
            println!("词库分类列表:");
            for category in word_list.categories() {
                let words = word_list.category_words(category).unwrap_or_default();
                println!("  {}: {} 个单词", category, words.len());
                let line = words
                    .iter()
                    .map(|w| w.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("    {}", line);
            }
        }
        Some(("add", args)) => {
            let category = arg(args, "category");
            let word = arg(args, "word");
            if word_list.add_word(category, word)? {
                save(&word_list)?;
                println!("成功添加单词: {} -> {}", word.to_uppercase(), category);
            } else {
                println!("单词 {} 已在分类 {} 中", word.to_uppercase(), category);
            }
        }
        Some(("remove", args)) => {
            let word = arg(args, "word");
            let removed = word_list.remove_word(word)?;
            if removed > 0 {
                save(&word_list)?;
                println!("已删除 {} 处 {}", removed, word.to_uppercase());
            } else {
                println!("词库中没有 {}", word.to_uppercase());
            }
        }
        Some(("stats", _)) => {
            let stats = word_list.stats();
            println!("词库统计信息:");
            println!("  总单词数: {}", stats.total_words);
            println!("  总分类数: {}", stats.total_categories);
            println!("  无效条目: {}", stats.rejected);
            println!("  分类分布:");
            for (category, count) in &stats.category_stats {
                println!("    {}: {}", category, count);
            }
        }
        Some(("validate", _)) => {
            let errors = word_list.validate();
            if errors.is_empty() {
                println!("词库验证通过！");
            } else {
                println!("词库验证发现 {} 个问题:", errors.len());
                for error in errors {
                    println!("  - {}", error);
                }
            }
        }
        Some(("export", args)) => {
            let file_path = arg(args, "file");
            word_list.save_to_file(file_path)?;
            println!("成功导出词库到: {}", file_path);
        }
        _ => println!("请使用 --help 查看可用命令"),
    }

    Ok(())
}

fn main() {
    let matches = cli().get_matches();
    if let Err(e) = run(&matches) {
        eprintln!("错误: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands() {
        let matches = cli()
            .try_get_matches_from(["word-manager", "add", "hard", "fjord"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "add");
        assert_eq!(arg(args, "category"), "hard");
        assert_eq!(arg(args, "word"), "fjord");

        assert!(cli().try_get_matches_from(["word-manager", "add", "hard"]).is_err());
        assert!(cli().try_get_matches_from(["word-manager"]).is_err());
    }
}
