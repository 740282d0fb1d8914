use clap::{arg,crate_version,Command};
use tianocompress::{tiano,STD_OPTIONS,TIANO_OPTIONS};
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

const RCH: &str = "unreachable was reached";

fn ok_to_overwrite(path_out: &str) -> bool {
    if let Ok(_f) = std::fs::File::open(path_out) {
        let mut ans = String::new();
        eprint!("{} exists, overwrite? (y/n) ",path_out);
        if std::io::stdin().read_line(&mut ans).is_err() {
            return false;
        }
        return ans.trim_end()=="y" || ans.trim_end()=="Y";
    }
    true
}

fn main() -> STDRESULT
{
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let long_help =
"Examples:
---------
Compress:      `tianocompress compress -m efi -i my_expanded -o my_compressed`
Expand:        `tianocompress expand -m efi -i my_compressed -o my_expanded`";

    let methods = ["efi","tiano"];

    let mut main_cmd = Command::new("tianocompress")
        .about("Compress and expand UEFI firmware sections")
        .after_long_help(long_help)
        .version(crate_version!());
    main_cmd = main_cmd.subcommand(Command::new("compress")
        .arg(arg!(-m --method <METHOD> "compression format").value_parser(methods)
            .required(true))
        .arg(arg!(-i --input <PATH> "input path").required(true))
        .arg(arg!(-o --output <PATH> "output path").required(true))
        .about("compress a file"));

    main_cmd = main_cmd.subcommand(Command::new("expand")
        .arg(arg!(-m --method <METHOD> "compression format").value_parser(methods)
            .required(true))
        .arg(arg!(-i --input <PATH> "input path").required(true))
        .arg(arg!(-o --output <PATH> "output path").required(true))
        .about("expand a file"));

    let matches = main_cmd.get_matches();

    if let Some((action,cmd)) = matches.subcommand() {
        let path_in = cmd.get_one::<String>("input").expect(RCH);
        let path_out = cmd.get_one::<String>("output").expect(RCH);
        let method = cmd.get_one::<String>("method").expect(RCH);
        let opt = match method.as_str() {
            "efi" => STD_OPTIONS,
            "tiano" => TIANO_OPTIONS,
            _ => {
                eprintln!("{} not supported",method);
                return Err(Box::new(std::fmt::Error));
            }
        };
        if !ok_to_overwrite(path_out) {
            eprintln!("abort operation");
            return Ok(());
        }
        let mut in_file = std::fs::File::open(path_in)?;
        // output is only created once the input has been processed
        let mut out_buf: Vec<u8> = Vec::new();
        let (in_size,out_size) = match action {
            "compress" => tiano::compress_stream(&mut in_file,&mut out_buf,&opt)?,
            _ => tiano::expand_stream(&mut in_file,&mut out_buf,&opt)?
        };
        std::fs::write(path_out,&out_buf)?;
        match action {
            "compress" => eprintln!("compressed {} into {}",in_size,out_size),
            _ => eprintln!("expanded {} into {}",in_size,out_size)
        }
    }

    Ok(())
}
