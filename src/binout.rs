// Binary writer.
//
// Grounded on spec §4.5's `.STORE` directive and §6's Binary output: one
// file per `StoreDirective`, an optional little-endian load-address word
// prepended when `.LOAD` preceded the `.STORE`.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::image::{Image, StoreDirective};

pub fn write_stores(image: &Image, base_dir: &Path) -> io::Result<()> {
    for store in image.stores() {
        write_one(image, store, base_dir)?;
    }
    Ok(())
}

fn write_one(image: &Image, store: &StoreDirective, base_dir: &Path) -> io::Result<()> {
    let path = base_dir.join(&store.path);
    let mut file = File::create(path)?;
    if let Some(load_addr) = store.load_prefix {
        file.write_all(&[(load_addr & 0xFF) as u8, (load_addr >> 8) as u8])?;
    }
    file.write_all(image.slice(store.start, store.end))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn writes_raw_bytes_without_load_prefix() {
        let dir = std::env::temp_dir().join(format!("asm65-binout-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut img = Image::new(0);
        img.set_final_pass(true);
        img.write(0x1000, &[1, 2, 3]).unwrap();
        img.add_store(StoreDirective { start: 0x1000, end: 0x1002, path: "out.bin".into(), load_prefix: None }).unwrap();
        write_stores(&img, &dir).unwrap();
        let mut contents = Vec::new();
        File::open(dir.join("out.bin")).unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(contents, vec![1, 2, 3]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn prepends_load_address_when_set() {
        let dir = std::env::temp_dir().join(format!("asm65-binout-test-load-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut img = Image::new(0);
        img.set_final_pass(true);
        img.write(0xC000, &[0xEA]).unwrap();
        img.add_store(StoreDirective { start: 0xC000, end: 0xC000, path: "prg.bin".into(), load_prefix: Some(0xC000) }).unwrap();
        write_stores(&img, &dir).unwrap();
        let mut contents = Vec::new();
        File::open(dir.join("prg.bin")).unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(contents, vec![0x00, 0xC0, 0xEA]);
        std::fs::remove_dir_all(&dir).ok();
    }
}
