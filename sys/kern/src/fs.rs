// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RAM-resident mini file system.
//!
//! One contiguous image, allocated from the kernel heap at mount time and
//! laid out as: superblock, inode bitmap, block bitmap, inode table, data
//! blocks. The namespace is a single flat root directory (inode 0) whose
//! entries point at file inodes; files address their data through a short
//! direct-block array, so the maximum file size is
//! `DIRECT_BLOCKS * BLOCK_SIZE` bytes. Nothing survives a reboot.
//!
//! All multi-byte structures are read and written through zerocopy views at
//! fixed offsets; the image is just bytes and carries no pointers.

use abi::SysError;
use unwrap_lite::UnwrapLite;
use zerocopy::{AsBytes, FromBytes, LayoutVerified};

pub const FS_MAGIC: u32 = 0x5246_5331; // "RFS1"

pub const INODE_COUNT: usize = 32;
pub const BLOCK_COUNT: usize = 64;
pub const BLOCK_SIZE: usize = 256;
pub const DIRECT_BLOCKS: usize = 6;

/// Largest file the direct-block array can address.
pub const MAX_FILE_SIZE: usize = DIRECT_BLOCKS * BLOCK_SIZE;

/// Directory-entry inode field value marking a vacant slot.
const VACANT: u16 = 0xFFFF;

const KIND_FREE: u16 = 0;
const KIND_FILE: u16 = 1;
const KIND_DIR: u16 = 2;

#[derive(Copy, Clone, Debug, FromBytes, AsBytes)]
#[repr(C)]
struct Superblock {
    magic: u32,
    inode_count: u32,
    block_count: u32,
    free_inodes: u32,
    free_blocks: u32,
}

#[derive(Copy, Clone, Debug, FromBytes, AsBytes)]
#[repr(C)]
struct Inode {
    /// Payload bytes. For directories, `block_count * BLOCK_SIZE`.
    size: u32,
    kind: u16,
    block_count: u16,
    direct: [u16; DIRECT_BLOCKS],
}

#[derive(Copy, Clone, Debug, FromBytes, AsBytes)]
#[repr(C)]
struct DirEntry {
    inode: u16,
    reserved: u16,
    name: [u8; abi::FS_NAME_LEN],
}

const SUPERBLOCK_OFF: usize = 0;
const INODE_BITMAP_OFF: usize =
    SUPERBLOCK_OFF + core::mem::size_of::<Superblock>();
const BLOCK_BITMAP_OFF: usize = INODE_BITMAP_OFF + INODE_COUNT / 8;
const INODE_TABLE_OFF: usize = BLOCK_BITMAP_OFF + BLOCK_COUNT / 8;
const DATA_OFF: usize =
    INODE_TABLE_OFF + INODE_COUNT * core::mem::size_of::<Inode>();

/// Bytes the whole image occupies in the heap.
pub const IMAGE_SIZE: usize = DATA_OFF + BLOCK_COUNT * BLOCK_SIZE;

const ENTRY_SIZE: usize = core::mem::size_of::<DirEntry>();
const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / ENTRY_SIZE;

/// The mounted file system: an owned view over the image region.
pub struct Fs {
    base: *mut u8,
    len: usize,
}

impl Fs {
    /// Carves the image out of the kernel heap and formats it.
    pub fn mount(heap: &mut crate::heap::Heap) -> Result<Fs, SysError> {
        let off = heap.alloc(IMAGE_SIZE).ok_or(SysError::NoSpace)?;
        let mut fs = Fs {
            base: (heap.base_addr() + off as usize) as *mut u8,
            len: IMAGE_SIZE,
        };
        fs.format();
        Ok(fs)
    }

    /// Re-initializes the image: fresh superblock, all inodes and blocks
    /// free, then the root directory allocated with one block of vacant
    /// entries. Everything previously stored is gone.
    pub fn format(&mut self) {
        self.bytes_mut().fill(0);
        self.write_sb(Superblock {
            magic: FS_MAGIC,
            inode_count: INODE_COUNT as u32,
            block_count: BLOCK_COUNT as u32,
            free_inodes: INODE_COUNT as u32,
            free_blocks: BLOCK_COUNT as u32,
        });

        let root_ino = self.alloc_inode().unwrap_lite();
        let root_block = self.alloc_block().unwrap_lite();
        uassert!(root_ino == 0);
        let mut root = Inode {
            size: BLOCK_SIZE as u32,
            kind: KIND_DIR,
            block_count: 1,
            direct: [0; DIRECT_BLOCKS],
        };
        root.direct[0] = root_block as u16;
        self.write_inode(0, root);
        self.init_dir_block(root_block);
    }

    /// Creates an empty file. The name must already be absent.
    pub fn create(&mut self, name: &[u8]) -> Result<(), SysError> {
        check_name(name)?;
        if self.lookup(name).is_some() {
            return Err(SysError::Exists);
        }
        let ino = self.alloc_inode().ok_or(SysError::NoInode)? as u16;
        self.write_inode(
            ino,
            Inode {
                size: 0,
                kind: KIND_FILE,
                block_count: 0,
                direct: [0; DIRECT_BLOCKS],
            },
        );

        let slot = match self.vacant_slot() {
            Some(s) => s,
            None => {
                // Couldn't place a directory entry; give the inode back.
                self.free_inode(ino);
                return Err(SysError::DirFull);
            }
        };
        let mut entry = DirEntry {
            inode: ino,
            reserved: 0,
            name: [0; abi::FS_NAME_LEN],
        };
        entry.name[..name.len()].copy_from_slice(name);
        self.write_entry(slot, entry);
        Ok(())
    }

    /// Replaces the file's contents with `data`. If the disk fills up
    /// mid-write the file keeps what made it in; the return value is the
    /// number of bytes actually stored.
    pub fn write(
        &mut self,
        name: &[u8],
        data: &[u8],
    ) -> Result<usize, SysError> {
        check_name(name)?;
        let (_, ino_idx) = self.lookup(name).ok_or(SysError::NotFound)?;
        let mut ino = self.inode(ino_idx);

        // Drop the old contents first; a rewrite never reuses blocks.
        for k in 0..usize::from(ino.block_count) {
            self.free_block(ino.direct[k]);
        }
        ino.block_count = 0;
        ino.size = 0;
        ino.direct = [0; DIRECT_BLOCKS];

        let needed = (data.len() + BLOCK_SIZE - 1) / BLOCK_SIZE;
        if needed > DIRECT_BLOCKS {
            self.write_inode(ino_idx, ino);
            return Err(SysError::TooLarge);
        }

        let mut written = 0;
        for (k, chunk) in data.chunks(BLOCK_SIZE).enumerate() {
            let block = match self.alloc_block() {
                Some(b) => b,
                None => break,
            };
            self.block_mut(block)[..chunk.len()].copy_from_slice(chunk);
            ino.direct[k] = block as u16;
            ino.block_count += 1;
            written += chunk.len();
        }
        ino.size = written as u32;
        self.write_inode(ino_idx, ino);
        Ok(written)
    }

    /// Copies up to `buf.len()` bytes of the file into `buf`, honoring the
    /// recorded size exactly; bytes past `size` in the last block are never
    /// read. Returns the number of bytes copied.
    pub fn read(
        &self,
        name: &[u8],
        buf: &mut [u8],
    ) -> Result<usize, SysError> {
        check_name(name)?;
        let (_, ino_idx) = self.lookup(name).ok_or(SysError::NotFound)?;
        let ino = self.inode(ino_idx);

        let n = (ino.size as usize).min(buf.len());
        let mut copied = 0;
        let mut k = 0;
        while copied < n {
            let take = (n - copied).min(BLOCK_SIZE);
            let block = self.block(ino.direct[k]);
            buf[copied..copied + take].copy_from_slice(&block[..take]);
            copied += take;
            k += 1;
        }
        Ok(n)
    }

    /// Writes a directory listing into `out`: one line per file, indented
    /// two spaces, newline-terminated, with a trailing NUL. Truncates
    /// rather than overflowing.
    pub fn list(&self, out: &mut [u8]) -> Result<(), SysError> {
        if out.is_empty() {
            return Err(SysError::BadAddress);
        }
        let mut pos = 0;
        let root = self.inode(0);
        for slot in 0..self.dir_slots(&root) {
            let entry = self.entry(slot);
            if entry.inode == VACANT {
                continue;
            }
            let name_len = entry
                .name
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(abi::FS_NAME_LEN);
            // Indent + name + newline, and room for the final NUL.
            if pos + 2 + name_len + 1 + 1 > out.len() {
                break;
            }
            out[pos..pos + 2].copy_from_slice(b"  ");
            pos += 2;
            out[pos..pos + name_len]
                .copy_from_slice(&entry.name[..name_len]);
            pos += name_len;
            out[pos] = b'\n';
            pos += 1;
        }
        out[pos] = 0;
        Ok(())
    }

    /// Removes a file: data blocks freed, inode cleared and released,
    /// directory entry made vacant again.
    pub fn delete(&mut self, name: &[u8]) -> Result<(), SysError> {
        check_name(name)?;
        let (slot, ino_idx) = self.lookup(name).ok_or(SysError::NotFound)?;
        let ino = self.inode(ino_idx);
        for k in 0..usize::from(ino.block_count) {
            self.free_block(ino.direct[k]);
        }
        self.write_inode(
            ino_idx,
            Inode {
                size: 0,
                kind: KIND_FREE,
                block_count: 0,
                direct: [0; DIRECT_BLOCKS],
            },
        );
        self.free_inode(ino_idx);
        self.write_entry(
            slot,
            DirEntry {
                inode: VACANT,
                reserved: 0,
                name: [0; abi::FS_NAME_LEN],
            },
        );
        Ok(())
    }

    /// Free (inode, block) counts from the superblock, for diagnostics.
    pub fn free_counts(&self) -> (u32, u32) {
        let sb = self.sb();
        (sb.free_inodes, sb.free_blocks)
    }

    // -- image plumbing -----------------------------------------------

    fn bytes(&self) -> &[u8] {
        // Safety: the image region was carved out of the heap for us alone.
        unsafe { core::slice::from_raw_parts(self.base, self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // Safety: as above.
        unsafe { core::slice::from_raw_parts_mut(self.base, self.len) }
    }

    fn sb(&self) -> Superblock {
        *LayoutVerified::<_, Superblock>::new(
            &self.bytes()[SUPERBLOCK_OFF..INODE_BITMAP_OFF],
        )
        .unwrap_lite()
    }

    fn write_sb(&mut self, sb: Superblock) {
        let mut lv = LayoutVerified::<_, Superblock>::new(
            &mut self.bytes_mut()[SUPERBLOCK_OFF..INODE_BITMAP_OFF],
        )
        .unwrap_lite();
        *lv = sb;
    }

    fn inode(&self, i: u16) -> Inode {
        let off = INODE_TABLE_OFF + usize::from(i) * core::mem::size_of::<Inode>();
        *LayoutVerified::<_, Inode>::new(
            &self.bytes()[off..off + core::mem::size_of::<Inode>()],
        )
        .unwrap_lite()
    }

    fn write_inode(&mut self, i: u16, ino: Inode) {
        let off = INODE_TABLE_OFF + usize::from(i) * core::mem::size_of::<Inode>();
        let mut lv = LayoutVerified::<_, Inode>::new(
            &mut self.bytes_mut()[off..off + core::mem::size_of::<Inode>()],
        )
        .unwrap_lite();
        *lv = ino;
    }

    fn block(&self, b: u16) -> &[u8] {
        let off = DATA_OFF + usize::from(b) * BLOCK_SIZE;
        &self.bytes()[off..off + BLOCK_SIZE]
    }

    fn block_mut(&mut self, b: usize) -> &mut [u8] {
        let off = DATA_OFF + b * BLOCK_SIZE;
        &mut self.bytes_mut()[off..off + BLOCK_SIZE]
    }

    // -- bitmaps ------------------------------------------------------

    fn bit_get(&self, byte_off: usize, idx: usize) -> bool {
        self.bytes()[byte_off + idx / 8] & (1 << (idx % 8)) != 0
    }

    fn bit_set(&mut self, byte_off: usize, idx: usize) {
        self.bytes_mut()[byte_off + idx / 8] |= 1 << (idx % 8);
    }

    fn bit_clear(&mut self, byte_off: usize, idx: usize) {
        self.bytes_mut()[byte_off + idx / 8] &= !(1 << (idx % 8));
    }

    /// First-fit by bit index.
    fn alloc_bit(&mut self, byte_off: usize, count: usize) -> Option<usize> {
        let idx = (0..count).find(|&i| !self.bit_get(byte_off, i))?;
        self.bit_set(byte_off, idx);
        Some(idx)
    }

    fn alloc_inode(&mut self) -> Option<usize> {
        let idx = self.alloc_bit(INODE_BITMAP_OFF, INODE_COUNT)?;
        let mut sb = self.sb();
        sb.free_inodes -= 1;
        self.write_sb(sb);
        Some(idx)
    }

    fn free_inode(&mut self, i: u16) {
        self.bit_clear(INODE_BITMAP_OFF, usize::from(i));
        let mut sb = self.sb();
        sb.free_inodes += 1;
        self.write_sb(sb);
    }

    fn alloc_block(&mut self) -> Option<usize> {
        let idx = self.alloc_bit(BLOCK_BITMAP_OFF, BLOCK_COUNT)?;
        let mut sb = self.sb();
        sb.free_blocks -= 1;
        self.write_sb(sb);
        Some(idx)
    }

    fn free_block(&mut self, b: u16) {
        self.bit_clear(BLOCK_BITMAP_OFF, usize::from(b));
        let mut sb = self.sb();
        sb.free_blocks += 1;
        self.write_sb(sb);
    }

    // -- root directory -----------------------------------------------

    fn dir_slots(&self, root: &Inode) -> usize {
        usize::from(root.block_count) * ENTRIES_PER_BLOCK
    }

    fn entry_off(&self, slot: usize) -> usize {
        let root = self.inode(0);
        let block = usize::from(root.direct[slot / ENTRIES_PER_BLOCK]);
        DATA_OFF
            + block * BLOCK_SIZE
            + (slot % ENTRIES_PER_BLOCK) * ENTRY_SIZE
    }

    fn entry(&self, slot: usize) -> DirEntry {
        let off = self.entry_off(slot);
        *LayoutVerified::<_, DirEntry>::new(
            &self.bytes()[off..off + ENTRY_SIZE],
        )
        .unwrap_lite()
    }

    fn write_entry(&mut self, slot: usize, entry: DirEntry) {
        let off = self.entry_off(slot);
        let mut lv = LayoutVerified::<_, DirEntry>::new(
            &mut self.bytes_mut()[off..off + ENTRY_SIZE],
        )
        .unwrap_lite();
        *lv = entry;
    }

    fn init_dir_block(&mut self, b: usize) {
        for e in 0..ENTRIES_PER_BLOCK {
            let off = DATA_OFF + b * BLOCK_SIZE + e * ENTRY_SIZE;
            let mut lv = LayoutVerified::<_, DirEntry>::new(
                &mut self.bytes_mut()[off..off + ENTRY_SIZE],
            )
            .unwrap_lite();
            *lv = DirEntry {
                inode: VACANT,
                reserved: 0,
                name: [0; abi::FS_NAME_LEN],
            };
        }
    }

    /// Scans the root for `name`; returns (directory slot, inode index).
    fn lookup(&self, name: &[u8]) -> Option<(usize, u16)> {
        let root = self.inode(0);
        for slot in 0..self.dir_slots(&root) {
            let entry = self.entry(slot);
            if entry.inode == VACANT {
                continue;
            }
            if name_matches(&entry.name, name) {
                return Some((slot, entry.inode));
            }
        }
        None
    }

    /// Finds a vacant directory slot, extending the root by one freshly
    /// initialized block when every existing slot is taken and the direct
    /// array still has room.
    fn vacant_slot(&mut self) -> Option<usize> {
        let mut root = self.inode(0);
        for slot in 0..self.dir_slots(&root) {
            if self.entry(slot).inode == VACANT {
                return Some(slot);
            }
        }
        if usize::from(root.block_count) == DIRECT_BLOCKS {
            return None;
        }
        let block = self.alloc_block()?;
        self.init_dir_block(block);
        let slot = self.dir_slots(&root);
        root.direct[usize::from(root.block_count)] = block as u16;
        root.block_count += 1;
        root.size = u32::from(root.block_count) * BLOCK_SIZE as u32;
        self.write_inode(0, root);
        Some(slot)
    }
}

fn check_name(name: &[u8]) -> Result<(), SysError> {
    if name.is_empty() || name.len() > abi::FS_NAME_LEN {
        return Err(SysError::NameTooLong);
    }
    Ok(())
}

fn name_matches(stored: &[u8; abi::FS_NAME_LEN], name: &[u8]) -> bool {
    let n = name.len();
    &stored[..n] == name && (n == abi::FS_NAME_LEN || stored[n] == 0)
}
