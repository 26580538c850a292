// This file is part of Nitrogen.
//
// Nitrogen is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Nitrogen is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Nitrogen.  If not, see <http://www.gnu.org/licenses/>.

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Role {
    Read,
    Write,
}

/// Two owned slots of which one is read while the other is written.
#[derive(Debug)]
pub struct PingPong<T> {
    slots: [T; 2],
    read: usize,
}

impl<T> PingPong<T> {
    pub fn new(first: T, second: T) -> Self {
        Self {
            slots: [first, second],
            read: 0,
        }
    }

    pub fn current(&self) -> &T {
        &self.slots[self.read]
    }

    pub fn current_mut(&mut self) -> &mut T {
        &mut self.slots[self.read]
    }

    pub fn other(&self) -> &T {
        &self.slots[1 - self.read]
    }

    pub fn other_mut(&mut self) -> &mut T {
        &mut self.slots[1 - self.read]
    }

    pub fn get(&self, role: Role) -> &T {
        match role {
            Role::Read => self.current(),
            Role::Write => self.other(),
        }
    }

    pub fn get_mut(&mut self, role: Role) -> &mut T {
        match role {
            Role::Read => self.current_mut(),
            Role::Write => self.other_mut(),
        }
    }

    pub fn swap_roles(&mut self) {
        self.read = 1 - self.read;
    }

    pub fn read_index(&self) -> usize {
        self.read
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_swap_exchanges_roles() {
        let mut pp = PingPong::new("a", "b");
        assert_eq!(pp.read_index(), 0);
        assert_eq!(*pp.get(Role::Read), "a");
        assert_eq!(*pp.get(Role::Write), "b");
        pp.swap_roles();
        assert_eq!(pp.read_index(), 1);
        assert_eq!(*pp.current(), "b");
        assert_eq!(*pp.other(), "a");
        pp.swap_roles();
        assert_eq!(*pp.current(), "a");
    }

    #[test]
    fn test_write_then_swap_publishes() {
        let mut pp = PingPong::new(0, 0);
        *pp.get_mut(Role::Write) = 7;
        assert_eq!(*pp.get(Role::Read), 0);
        pp.swap_roles();
        assert_eq!(*pp.get(Role::Read), 7);
    }
}
